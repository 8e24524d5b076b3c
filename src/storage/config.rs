//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux/macOS: `~/.config/bigscan/config.toml`
//! - Windows: `%APPDATA%/bigscan/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `BIGSCAN_TIMEOUT`: Per-request timeout in seconds
//! - `BIGSCAN_PACING`: Pause between devices in seconds
//! - `BIGSCAN_POLL_INTERVAL`: Capture status poll interval in seconds
//! - `BIGSCAN_QKVIEW_TIMEOUT` / `BIGSCAN_UCS_TIMEOUT`: Capture deadlines in seconds
//! - `BIGSCAN_NO_COLOR` or `NO_COLOR`: Disable colors (1, true, yes)
//! - `BIGSCAN_CONFIG`: Override config file path

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::cli::args::Cli;
use crate::core::capture::{CaptureConfig, CaptureKind};
use crate::core::session::SessionConfig;
use crate::error::{Result, ScanError};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable for the per-request timeout in seconds.
pub const ENV_TIMEOUT: &str = "BIGSCAN_TIMEOUT";
/// Environment variable for the pause between devices in seconds.
pub const ENV_PACING: &str = "BIGSCAN_PACING";
/// Environment variable for the capture poll interval in seconds.
pub const ENV_POLL_INTERVAL: &str = "BIGSCAN_POLL_INTERVAL";
/// Environment variable for the QKView deadline in seconds.
pub const ENV_QKVIEW_TIMEOUT: &str = "BIGSCAN_QKVIEW_TIMEOUT";
/// Environment variable for the UCS deadline in seconds.
pub const ENV_UCS_TIMEOUT: &str = "BIGSCAN_UCS_TIMEOUT";
/// Environment variable to disable colors.
pub const ENV_NO_COLOR: &str = "BIGSCAN_NO_COLOR";
/// Standard environment variable to disable colors.
pub const ENV_NO_COLOR_STD: &str = "NO_COLOR";
/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "BIGSCAN_CONFIG";

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// File values, for settings with no flag or env override.
    pub file: Config,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Pause between devices.
    pub pacing: Duration,
    /// Capture status poll interval.
    pub poll_interval: Duration,
    /// QKView deadline.
    pub qkview_timeout: Duration,
    /// UCS deadline.
    pub ucs_timeout: Duration,
    /// Whether to disable colored output.
    pub no_color: bool,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub request_timeout: ConfigSource,
    pub pacing: ConfigSource,
    pub poll_interval: ConfigSource,
    pub qkview_timeout: ConfigSource,
    pub ucs_timeout: ConfigSource,
    pub no_color: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI args, environment variables, and config file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file exists but is invalid
    /// - An environment variable holds something other than whole seconds
    /// - The merged values are inconsistent (poll interval not below a capture timeout)
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let file = Self::load_config()?;
        file.validate()?;
        Self::merge(cli, file)
    }

    /// Merge an already loaded file config with flags and environment.
    ///
    /// # Errors
    ///
    /// Same as [`ResolvedConfig::resolve`], minus file loading.
    pub fn merge(cli: &Cli, file: Config) -> Result<Self> {
        let mut sources = ConfigSources::default();
        let defaults = Config::default();

        let request_timeout = Self::resolve_seconds(
            None,
            ENV_TIMEOUT,
            file.general.request_timeout_seconds,
            defaults.general.request_timeout_seconds,
            &mut sources.request_timeout,
        )?;
        let pacing = Self::resolve_seconds(
            cli.pacing,
            ENV_PACING,
            file.general.pacing_seconds,
            defaults.general.pacing_seconds,
            &mut sources.pacing,
        )?;
        let poll_interval = Self::resolve_seconds(
            cli.poll_interval,
            ENV_POLL_INTERVAL,
            file.capture.poll_interval_seconds,
            defaults.capture.poll_interval_seconds,
            &mut sources.poll_interval,
        )?;
        let qkview_timeout = Self::resolve_seconds(
            cli.qkview_timeout,
            ENV_QKVIEW_TIMEOUT,
            file.capture.qkview_timeout_seconds,
            defaults.capture.qkview_timeout_seconds,
            &mut sources.qkview_timeout,
        )?;
        let ucs_timeout = Self::resolve_seconds(
            cli.ucs_timeout,
            ENV_UCS_TIMEOUT,
            file.capture.ucs_timeout_seconds,
            defaults.capture.ucs_timeout_seconds,
            &mut sources.ucs_timeout,
        )?;
        let no_color = Self::resolve_no_color(cli, &file, &mut sources.no_color);

        let resolved = Self {
            file,
            request_timeout,
            pacing,
            poll_interval,
            qkview_timeout,
            ucs_timeout,
            no_color,
            sources,
        };
        resolved.check_intervals()?;

        tracing::debug!(
            request_timeout = resolved.request_timeout.as_secs(),
            request_timeout_source = %resolved.sources.request_timeout,
            pacing = resolved.pacing.as_secs(),
            pacing_source = %resolved.sources.pacing,
            poll_interval = resolved.poll_interval.as_secs(),
            poll_interval_source = %resolved.sources.poll_interval,
            qkview_timeout = resolved.qkview_timeout.as_secs(),
            qkview_timeout_source = %resolved.sources.qkview_timeout,
            ucs_timeout = resolved.ucs_timeout.as_secs(),
            ucs_timeout_source = %resolved.sources.ucs_timeout,
            "Configuration resolved"
        );
        Ok(resolved)
    }

    /// Session tuning derived from the merged values.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            default_window: Duration::from_secs(self.file.session.token_timeout_seconds),
            extend_fraction: self.file.session.extend_fraction,
            request_timeout: self.request_timeout,
        }
    }

    /// Capture tuning for `kind` derived from the merged values.
    #[must_use]
    pub fn capture_config(&self, kind: CaptureKind) -> CaptureConfig {
        let (timeout, dir) = match kind {
            CaptureKind::QkView => (self.qkview_timeout, &self.file.capture.qkview_dir),
            CaptureKind::Ucs => (self.ucs_timeout, &self.file.capture.ucs_dir),
        };
        CaptureConfig {
            poll_interval: self.poll_interval,
            max_poll_retries: self.file.capture.max_poll_retries,
            timeout,
            output_dir: dir.clone(),
            ..CaptureConfig::for_kind(kind)
        }
    }

    fn check_intervals(&self) -> Result<()> {
        for (key, timeout) in [
            ("qkview_timeout", self.qkview_timeout),
            ("ucs_timeout", self.ucs_timeout),
        ] {
            if self.poll_interval >= timeout {
                return Err(ScanError::ConfigInvalid {
                    key: "poll_interval".to_string(),
                    value: self.poll_interval.as_secs().to_string(),
                    message: format!(
                        "must be shorter than {key} ({}s)",
                        timeout.as_secs()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Load config file, respecting `BIGSCAN_CONFIG` override.
    fn load_config() -> Result<Config> {
        if let Ok(path) = std::env::var(ENV_CONFIG) {
            Config::load_from(Path::new(&path))
        } else {
            Config::load()
        }
    }

    /// Resolve a whole-seconds setting.
    fn resolve_seconds(
        cli: Option<u64>,
        env: &str,
        file_value: u64,
        default_value: u64,
        source: &mut ConfigSource,
    ) -> Result<Duration> {
        // 1. CLI flag
        if let Some(seconds) = cli {
            *source = ConfigSource::Cli;
            return Ok(Duration::from_secs(seconds));
        }

        // 2. Environment variable
        if let Ok(raw) = std::env::var(env) {
            let seconds = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ScanError::ConfigInvalid {
                    key: env.to_string(),
                    value: raw.clone(),
                    message: "expected whole seconds".to_string(),
                })?;
            *source = ConfigSource::Env;
            return Ok(Duration::from_secs(seconds));
        }

        // 3. Config file, if it differs from the default
        *source = if file_value == default_value {
            ConfigSource::Default
        } else {
            ConfigSource::ConfigFile
        };
        Ok(Duration::from_secs(file_value))
    }

    /// Resolve `no_color` setting.
    fn resolve_no_color(cli: &Cli, config: &Config, source: &mut ConfigSource) -> bool {
        // 1. CLI --no-color flag
        if cli.no_color {
            *source = ConfigSource::Cli;
            return true;
        }

        // 2. Environment variable (BIGSCAN_NO_COLOR or standard NO_COLOR)
        if Self::is_env_truthy(ENV_NO_COLOR) || std::env::var(ENV_NO_COLOR_STD).is_ok() {
            *source = ConfigSource::Env;
            return true;
        }

        // 3. Config file (inverted: config.output.color = false means no_color = true)
        if !config.output.color {
            *source = ConfigSource::ConfigFile;
            return true;
        }

        // 4. Default
        *source = ConfigSource::Default;
        false
    }

    /// Check if an environment variable is set to a truthy value.
    fn is_env_truthy(var: &str) -> bool {
        std::env::var(var)
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false)
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Management API session settings.
    pub session: SessionSettings,
    /// QKView and UCS capture settings.
    pub capture: CaptureSettings,
    /// Output settings.
    pub output: OutputConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Timeout for a single management API request in seconds.
    pub request_timeout_seconds: u64,
    /// Pause between devices in seconds.
    pub pacing_seconds: u64,
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Token lifetime assumed when the device does not report one.
    pub token_timeout_seconds: u64,
    /// Fraction of the token lifetime after which it is extended.
    pub extend_fraction: f64,
}

/// Capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Seconds between status polls.
    pub poll_interval_seconds: u64,
    /// Consecutive transient poll errors tolerated.
    pub max_poll_retries: u32,
    /// QKView deadline in seconds.
    pub qkview_timeout_seconds: u64,
    /// UCS deadline in seconds.
    pub ucs_timeout_seconds: u64,
    /// Local directory for QKView files.
    pub qkview_dir: PathBuf,
    /// Local directory for UCS files.
    pub ucs_dir: PathBuf,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Whether to use colors in output.
    pub color: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            pacing_seconds: 2,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            token_timeout_seconds: 1200,
            extend_fraction: 0.5,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 15,
            max_poll_retries: 3,
            qkview_timeout_seconds: CaptureKind::QkView.default_timeout().as_secs(),
            ucs_timeout_seconds: CaptureKind::Ucs.default_timeout().as_secs(),
            qkview_dir: PathBuf::from(CaptureKind::QkView.default_dir()),
            ucs_dir: PathBuf::from(CaptureKind::Ucs.default_dir()),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { color: true }
    }
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| ScanError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ScanError::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        AppPaths::new().config_file()
    }

    /// Validate configuration values.
    ///
    /// Checks that:
    /// - Timeouts and intervals are non-zero
    /// - The extension fraction lies strictly between 0 and 1
    /// - The poll interval is shorter than both capture timeouts
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, value: String, message: &str| ScanError::ConfigInvalid {
            key: key.to_string(),
            value,
            message: message.to_string(),
        };

        for (key, value) in [
            ("general.request_timeout_seconds", self.general.request_timeout_seconds),
            ("session.token_timeout_seconds", self.session.token_timeout_seconds),
            ("capture.poll_interval_seconds", self.capture.poll_interval_seconds),
            ("capture.qkview_timeout_seconds", self.capture.qkview_timeout_seconds),
            ("capture.ucs_timeout_seconds", self.capture.ucs_timeout_seconds),
        ] {
            if value == 0 {
                return Err(invalid(key, value.to_string(), "must be greater than 0"));
            }
        }

        let fraction = self.session.extend_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(invalid(
                "session.extend_fraction",
                fraction.to_string(),
                "must be between 0 and 1 (exclusive)",
            ));
        }

        let poll = self.capture.poll_interval_seconds;
        if poll >= self.capture.qkview_timeout_seconds || poll >= self.capture.ucs_timeout_seconds
        {
            return Err(invalid(
                "capture.poll_interval_seconds",
                poll.to_string(),
                "must be shorter than both capture timeouts",
            ));
        }

        Ok(())
    }
}
