//! Credential resolution.
//!
//! Each field is taken from the first source that has it:
//! 1. the device's own input row (trimmed, non-empty),
//! 2. the run-wide fallback from `--user` / `--pass`,
//! 3. an interactive prompt (username echoed, password hidden).
//!
//! Passwords live in [`Zeroizing`] buffers and never appear in `Debug`
//! output or logs.

use std::fmt;

use dialoguer::console::Term;
use dialoguer::{Input, Password};
use zeroize::Zeroizing;

use crate::error::{Result, ScanError};
use crate::util::env::can_prompt;

/// Username and password for one device.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    password: Zeroizing<String>,
}

impl Credential {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// Plain password, for the login body only.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where a resolved field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Row,
    Fallback,
    Prompt,
}

impl CredentialSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Row => "row",
            Self::Fallback => "fallback",
            Self::Prompt => "prompt",
        }
    }
}

/// Interactive input for missing fields.
pub trait Prompter: Send + Sync {
    /// False when nobody can answer a prompt.
    fn is_interactive(&self) -> bool;

    /// Ask for a username (echoed).
    ///
    /// # Errors
    ///
    /// Returns error if the terminal cannot be read.
    fn prompt_username(&self, host: &str) -> Result<String>;

    /// Ask for a password (not echoed).
    ///
    /// # Errors
    ///
    /// Returns error if the terminal cannot be read.
    fn prompt_password(&self, host: &str, username: &str) -> Result<String>;
}

/// Prompts on the controlling terminal via `dialoguer`.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        can_prompt()
    }

    fn prompt_username(&self, host: &str) -> Result<String> {
        Input::<String>::new()
            .with_prompt(format!("Username for {host}"))
            .interact_text_on(&Term::stderr())
            .map_err(|e| ScanError::Other(anyhow::anyhow!("username prompt failed: {e}")))
    }

    fn prompt_password(&self, host: &str, username: &str) -> Result<String> {
        Password::new()
            .with_prompt(format!("Password for {username}@{host}"))
            .interact_on(&Term::stderr())
            .map_err(|e| ScanError::Other(anyhow::anyhow!("password prompt failed: {e}")))
    }
}

/// Never prompts; unresolved fields become [`ScanError::CredentialsUnresolved`].
#[derive(Debug, Default)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn is_interactive(&self) -> bool {
        false
    }

    fn prompt_username(&self, host: &str) -> Result<String> {
        Err(ScanError::CredentialsUnresolved {
            host: host.to_string(),
            field: "username",
        })
    }

    fn prompt_password(&self, host: &str, _username: &str) -> Result<String> {
        Err(ScanError::CredentialsUnresolved {
            host: host.to_string(),
            field: "password",
        })
    }
}

/// Run-wide fallback values from the command line.
#[derive(Clone, Default)]
pub struct FallbackCredentials {
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
}

impl FallbackCredentials {
    #[must_use]
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self {
            username: non_blank(username.as_deref()),
            password: non_blank(password.as_deref()).map(Zeroizing::new),
        }
    }
}

impl fmt::Debug for FallbackCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolves a [`Credential`] per device from row, fallback and prompt.
pub struct CredentialResolver<'a> {
    fallback: FallbackCredentials,
    prompter: &'a dyn Prompter,
}

impl<'a> CredentialResolver<'a> {
    #[must_use]
    pub fn new(fallback: FallbackCredentials, prompter: &'a dyn Prompter) -> Self {
        Self { fallback, prompter }
    }

    /// Resolve credentials for `host`.
    ///
    /// # Errors
    ///
    /// [`ScanError::CredentialsUnresolved`] when a field is missing from every
    /// non-interactive source and the prompter cannot ask.
    pub fn resolve(
        &self,
        host: &str,
        row_username: Option<&str>,
        row_password: Option<&str>,
    ) -> Result<Credential> {
        let (username, user_source) = match non_blank(row_username) {
            Some(u) => (u, CredentialSource::Row),
            None => match &self.fallback.username {
                Some(u) => (u.clone(), CredentialSource::Fallback),
                None => (self.ask_username(host)?, CredentialSource::Prompt),
            },
        };

        let (password, pass_source) = match non_blank(row_password) {
            Some(p) => (Zeroizing::new(p), CredentialSource::Row),
            None => match &self.fallback.password {
                Some(p) => (p.clone(), CredentialSource::Fallback),
                None => (
                    Zeroizing::new(self.ask_password(host, &username)?),
                    CredentialSource::Prompt,
                ),
            },
        };

        tracing::debug!(
            host,
            username = %username,
            username_source = user_source.as_str(),
            password_source = pass_source.as_str(),
            "Resolved credentials"
        );

        Ok(Credential { username, password })
    }

    fn ask_username(&self, host: &str) -> Result<String> {
        if !self.prompter.is_interactive() {
            return Err(ScanError::CredentialsUnresolved {
                host: host.to_string(),
                field: "username",
            });
        }
        let value = self.prompter.prompt_username(host)?;
        non_blank(Some(&value)).ok_or_else(|| ScanError::CredentialsUnresolved {
            host: host.to_string(),
            field: "username",
        })
    }

    fn ask_password(&self, host: &str, username: &str) -> Result<String> {
        if !self.prompter.is_interactive() {
            return Err(ScanError::CredentialsUnresolved {
                host: host.to_string(),
                field: "password",
            });
        }
        let value = self.prompter.prompt_password(host, username)?;
        if value.is_empty() {
            return Err(ScanError::CredentialsUnresolved {
                host: host.to_string(),
                field: "password",
            });
        }
        Ok(value)
    }
}
