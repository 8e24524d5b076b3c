//! Fix suggestions for scan errors.
//!
//! Each generator returns short, operator-facing hints: commands that help
//! narrow the problem down plus a sentence of context. The human renderer
//! prints the first suggestion under each failed device.

// =============================================================================
// Fix Suggestion Type
// =============================================================================

/// A fix suggestion for an error.
#[derive(Debug, Clone)]
pub struct FixSuggestion {
    /// Commands to try, most useful first. Copy-paste ready.
    pub commands: Vec<String>,

    /// What most likely happened.
    pub context: String,

    /// How to avoid the error on the next run.
    pub prevention: Option<String>,
}

impl FixSuggestion {
    /// Creates a new fix suggestion with required fields.
    #[must_use]
    pub fn new(commands: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            commands,
            context: context.into(),
            prevention: None,
        }
    }

    /// Builder: adds prevention tips.
    #[must_use]
    pub fn with_prevention(mut self, prevention: impl Into<String>) -> Self {
        self.prevention = Some(prevention.into());
        self
    }
}

// =============================================================================
// Authentication
// =============================================================================

/// Suggestions when a credential field could not be resolved.
#[must_use]
pub fn credentials_unresolved_suggestions(host: &str, field: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![
                "bigscan --in devices.csv --user admin".to_string(),
                "BIGSCAN_PASSWORD=... bigscan --in devices.csv".to_string(),
            ],
            format!(
                "No {field} was available for {host}: the input row left it blank, \
                 no command-line fallback was given, and prompting is disabled."
            ),
        )
        .with_prevention("Fill the username/password columns or pass --user/--pass."),
    ]
}

/// Suggestions when the device rejected the login.
#[must_use]
pub fn auth_rejected_suggestions(host: &str, status: u16) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![format!(
                "curl -sk -X POST https://{host}/mgmt/shared/authn/login \
                 -d '{{\"username\":\"<user>\",\"password\":\"<pass>\",\"loginProviderName\":\"tmos\"}}'"
            )],
            format!(
                "{host} answered the login request with HTTP {status}. The account may \
                 be wrong, locked, or lack REST API access."
            ),
        )
        .with_prevention(
            "Use an account with the Administrator role; remote-auth accounts may need \
             a different login provider.",
        ),
    ]
}

/// Suggestions when the token stopped being accepted mid-scan.
#[must_use]
pub fn session_expired_suggestions(host: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("bigscan --host {host}")],
        format!(
            "The authentication token for {host} was rejected after login. It may \
             have expired or been revoked by another administrator."
        ),
    )
    .with_prevention("Raise [session] token_timeout_seconds if captures run long.")]
}

// =============================================================================
// Network
// =============================================================================

/// Suggestions for DNS resolution failures.
#[must_use]
pub fn dns_failure_suggestions(host: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("nslookup {host}"), "cat /etc/resolv.conf".to_string()],
        format!("The management address {host} could not be resolved."),
    )
    .with_prevention("List devices by management IP instead of hostname.")]
}

/// Suggestions for TLS handshake failures.
#[must_use]
pub fn tls_failure_suggestions(host: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("openssl s_client -connect {host}:443")],
        format!(
            "The TLS handshake with {host} failed: {message}. Certificate trust is not \
             checked, so this usually means a protocol or cipher mismatch."
        ),
    )]
}

/// Suggestions for refused connections.
#[must_use]
pub fn connection_refused_suggestions(host: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![
            format!("curl -skv https://{host}/"),
            format!("nc -vz {host} 443"),
        ],
        format!(
            "{host} refused the connection. The management interface may be down, \
             on a different port, or filtered by a firewall."
        ),
    )]
}

/// Suggestions for request timeouts.
#[must_use]
pub fn request_timeout_suggestions(host: &str, seconds: u64) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("ping {host}")],
        format!("{host} did not answer within {seconds}s."),
    )
    .with_prevention("Raise [general] request_timeout_seconds for slow links.")]
}

// =============================================================================
// Capture
// =============================================================================

/// Suggestions when a capture did not finish in time.
#[must_use]
pub fn capture_timeout_suggestions(host: &str, seconds: u64) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!(
            "bigscan --host {host} --qkview --qkview-timeout {}",
            seconds * 2
        )],
        format!(
            "The capture on {host} was still running after {seconds}s. Busy or large \
             devices can take much longer to assemble a bundle."
        ),
    )]
}

/// Suggestions when the artifact transfer failed.
#[must_use]
pub fn download_suggestions(host: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("bigscan --host {host} --qkview")],
        format!(
            "The artifact on {host} was built but the transfer did not complete. \
             The remote copy has been removed; rerun the capture."
        ),
    )
    .with_prevention("Check free disk space in the output directory.")]
}

// =============================================================================
// Configuration
// =============================================================================

/// Suggestions for config file syntax errors.
#[must_use]
pub fn config_parse_suggestions(path: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("$EDITOR {path}")],
        format!("The config file is not valid TOML: {message}"),
    )]
}

/// Suggestions for invalid config values.
#[must_use]
pub fn config_invalid_suggestions(key: &str, value: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        Vec::new(),
        format!("'{key}' = '{value}' is not allowed: {message}"),
    )]
}

/// Suggestions when the device list could not be read.
#[must_use]
pub fn input_file_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("head -3 {path}")],
        format!(
            "{path} must be a CSV with one device per row: ip,username,password. \
             A header row is optional."
        ),
    )]
}
