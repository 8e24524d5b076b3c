//! Error types for bigscan.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are grouped into six categories:
//! - **Authentication**: unresolved credentials, rejected logins, expired tokens
//! - **Network**: DNS, TLS, refused connections, timeouts
//! - **Device**: unexpected status codes or unparseable bodies from the REST API
//! - **Capture**: diagnostic/backup task submission, polling, download, cleanup
//! - **Configuration**: config file, device list, or flag problems
//! - **Internal**: I/O, serialization and anything unclassified
//!
//! Each error has a stable code (e.g. `BIGSCAN-A002`) that ends up in the
//! JSON summary. Everything except configuration errors is caught at the
//! per-device boundary and recorded in that device's result.

pub mod suggestions;

use thiserror::Error;

use crate::core::capture::TaskState;

pub use suggestions::FixSuggestion;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential resolution and token problems.
    Authentication,
    /// Transport failures before an HTTP response was received.
    Network,
    /// The device answered, but not the way we expected.
    Device,
    /// Asynchronous capture job failures.
    Capture,
    /// Invalid configuration or input; fatal before the first device.
    Configuration,
    /// Bugs, I/O and serialization failures.
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Authentication => "Authentication error",
            Self::Network => "Network error",
            Self::Device => "Device API error",
            Self::Capture => "Capture error",
            Self::Configuration => "Configuration error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Authentication => "A",
            Self::Network => "N",
            Self::Device => "D",
            Self::Capture => "T",
            Self::Configuration => "C",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Every device scanned cleanly.
    Success = 0,
    /// The batch ran, but at least one device has an error recorded.
    DeviceFailures = 1,
    /// Bad flags, config, or device list; no device was attempted.
    Usage = 2,
    /// Unexpected failure outside the per-device boundary.
    GeneralError = 3,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for bigscan operations.
#[derive(Error, Debug)]
pub enum ScanError {
    // ==========================================================================
    // Authentication errors (Category: Authentication)
    // ==========================================================================
    /// A credential field is still missing and prompting is not possible.
    #[error("no {field} available for {host} and prompting is disabled")]
    CredentialsUnresolved { host: String, field: &'static str },

    /// The device refused the login (401/403).
    #[error("authentication failed for {host} (HTTP {status})")]
    AuthRejected { host: String, status: u16 },

    /// A previously valid token was rejected.
    #[error("session expired for {host}")]
    SessionExpired { host: String },

    // ==========================================================================
    // Network errors (Category: Network)
    // ==========================================================================
    /// Management address did not resolve.
    #[error("DNS resolution failed for {host}")]
    DnsFailure { host: String },

    /// TLS handshake failure.
    #[error("TLS error talking to {host}: {message}")]
    TlsFailure { host: String, message: String },

    /// TCP connection refused.
    #[error("connection refused: {host}")]
    ConnectionRefused { host: String },

    /// A single request exceeded the client timeout.
    #[error("request to {host} timed out after {seconds}s")]
    RequestTimeout { host: String, seconds: u64 },

    /// Any other transport failure.
    #[error("network error talking to {host}: {message}")]
    Network { host: String, message: String },

    // ==========================================================================
    // Device errors (Category: Device)
    // ==========================================================================
    /// Unexpected HTTP status from the REST API.
    #[error("{host} returned HTTP {status}: {message}")]
    DeviceApi {
        host: String,
        status: u16,
        message: String,
    },

    /// Response body did not have the expected shape.
    #[error("unexpected response from {host}: {message}")]
    ParseResponse { host: String, message: String },

    // ==========================================================================
    // Capture errors (Category: Capture)
    // ==========================================================================
    /// The device refused to create the capture job.
    #[error("{host} rejected the {kind} task: {message}")]
    TaskSubmission {
        host: String,
        kind: &'static str,
        message: String,
    },

    /// Status polling kept failing.
    #[error("polling task {task_id} on {host} failed {attempts} times: {message}")]
    Poll {
        host: String,
        task_id: String,
        attempts: u32,
        message: String,
    },

    /// The task did not finish before the deadline.
    #[error("task {task_id} on {host} did not finish within {seconds}s")]
    CaptureTimeout {
        host: String,
        task_id: String,
        seconds: u64,
    },

    /// The device reported the task as failed.
    #[error("task {task_id} on {host} failed: {reason}")]
    CaptureFailed {
        host: String,
        task_id: String,
        reason: String,
    },

    /// Artifact transfer failed or produced an unusable file.
    #[error("download from {host} failed: {message}")]
    Download { host: String, message: String },

    /// Remote task or artifact could not be removed. Logged only.
    #[error("cleanup of task {task_id} on {host} failed: {message}")]
    Cleanup {
        host: String,
        task_id: String,
        message: String,
    },

    /// A task state change that the lifecycle does not allow.
    #[error("illegal task transition {from} -> {to}")]
    InvalidTransition { from: TaskState, to: TaskState },

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Config file is not valid TOML.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// A config value is out of range.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    /// The device list could not be read.
    #[error("cannot read device list {path}: {message}")]
    InputFile { path: String, message: String },

    /// Nothing to scan.
    #[error("no devices to scan")]
    NoDevices,

    // ==========================================================================
    // Internal errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScanError {
    /// Exit code when this error escapes to the top level.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self.category() {
            ErrorCategory::Configuration => ExitCode::Usage,
            _ => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::CredentialsUnresolved { .. }
            | Self::AuthRejected { .. }
            | Self::SessionExpired { .. } => ErrorCategory::Authentication,

            Self::DnsFailure { .. }
            | Self::TlsFailure { .. }
            | Self::ConnectionRefused { .. }
            | Self::RequestTimeout { .. }
            | Self::Network { .. } => ErrorCategory::Network,

            Self::DeviceApi { .. } | Self::ParseResponse { .. } => ErrorCategory::Device,

            Self::TaskSubmission { .. }
            | Self::Poll { .. }
            | Self::CaptureTimeout { .. }
            | Self::CaptureFailed { .. }
            | Self::Download { .. }
            | Self::Cleanup { .. }
            | Self::InvalidTransition { .. } => ErrorCategory::Capture,

            Self::Config(_)
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::InputFile { .. }
            | Self::NoDevices => ErrorCategory::Configuration,

            Self::Io(_) | Self::Json(_) | Self::Csv(_) | Self::Other(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `BIGSCAN-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            // Authentication errors (A001-A099)
            Self::CredentialsUnresolved { .. } => "BIGSCAN-A001",
            Self::AuthRejected { .. } => "BIGSCAN-A002",
            Self::SessionExpired { .. } => "BIGSCAN-A003",

            // Network errors (N001-N099)
            Self::DnsFailure { .. } => "BIGSCAN-N001",
            Self::TlsFailure { .. } => "BIGSCAN-N002",
            Self::ConnectionRefused { .. } => "BIGSCAN-N003",
            Self::RequestTimeout { .. } => "BIGSCAN-N004",
            Self::Network { .. } => "BIGSCAN-N099",

            // Device errors (D001-D099)
            Self::DeviceApi { .. } => "BIGSCAN-D001",
            Self::ParseResponse { .. } => "BIGSCAN-D002",

            // Capture errors (T001-T099)
            Self::TaskSubmission { .. } => "BIGSCAN-T001",
            Self::Poll { .. } => "BIGSCAN-T002",
            Self::CaptureTimeout { .. } => "BIGSCAN-T003",
            Self::CaptureFailed { .. } => "BIGSCAN-T004",
            Self::Download { .. } => "BIGSCAN-T005",
            Self::Cleanup { .. } => "BIGSCAN-T006",
            Self::InvalidTransition { .. } => "BIGSCAN-T007",

            // Configuration errors (C001-C099)
            Self::Config(_) => "BIGSCAN-C001",
            Self::ConfigParse { .. } => "BIGSCAN-C002",
            Self::ConfigInvalid { .. } => "BIGSCAN-C003",
            Self::InputFile { .. } => "BIGSCAN-C004",
            Self::NoDevices => "BIGSCAN-C005",

            // Internal errors (X001-X099)
            Self::Io(_) => "BIGSCAN-X001",
            Self::Json(_) => "BIGSCAN-X002",
            Self::Csv(_) => "BIGSCAN-X003",
            Self::Other(_) => "BIGSCAN-X099",
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Poll loops use this to tell a flaky link from a hard failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionRefused { .. }
            | Self::RequestTimeout { .. }
            | Self::Network { .. }
            | Self::ParseResponse { .. } => true,
            Self::DeviceApi { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Transport-level failure (the device was never reached).
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self.category(), ErrorCategory::Network)
    }

    /// Returns the device this error concerns, if any.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        match self {
            Self::CredentialsUnresolved { host, .. }
            | Self::AuthRejected { host, .. }
            | Self::SessionExpired { host }
            | Self::DnsFailure { host }
            | Self::TlsFailure { host, .. }
            | Self::ConnectionRefused { host }
            | Self::RequestTimeout { host, .. }
            | Self::Network { host, .. }
            | Self::DeviceApi { host, .. }
            | Self::ParseResponse { host, .. }
            | Self::TaskSubmission { host, .. }
            | Self::Poll { host, .. }
            | Self::CaptureTimeout { host, .. }
            | Self::CaptureFailed { host, .. }
            | Self::Download { host, .. }
            | Self::Cleanup { host, .. } => Some(host),
            _ => None,
        }
    }

    /// Returns actionable fix suggestions for this error.
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::CredentialsUnresolved { host, field } => {
                suggestions::credentials_unresolved_suggestions(host, field)
            }
            Self::AuthRejected { host, status } => {
                suggestions::auth_rejected_suggestions(host, *status)
            }
            Self::SessionExpired { host } => suggestions::session_expired_suggestions(host),

            Self::DnsFailure { host } => suggestions::dns_failure_suggestions(host),
            Self::TlsFailure { host, message } => {
                suggestions::tls_failure_suggestions(host, message)
            }
            Self::ConnectionRefused { host } => suggestions::connection_refused_suggestions(host),
            Self::RequestTimeout { host, seconds } => {
                suggestions::request_timeout_suggestions(host, *seconds)
            }

            Self::CaptureTimeout { host, seconds, .. } => {
                suggestions::capture_timeout_suggestions(host, *seconds)
            }
            Self::Download { host, .. } => suggestions::download_suggestions(host),

            Self::ConfigParse { path, message } => {
                suggestions::config_parse_suggestions(path, message)
            }
            Self::ConfigInvalid {
                key,
                value,
                message,
            } => suggestions::config_invalid_suggestions(key, value, message),
            Self::InputFile { path, .. } => suggestions::input_file_suggestions(path),
            Self::NoDevices => vec![FixSuggestion::new(
                vec![
                    "bigscan --in devices.csv".to_string(),
                    "bigscan --host 10.0.0.1 --host 10.0.0.2".to_string(),
                ],
                "No devices were given on the command line or in the input file.",
            )],

            _ => Vec::new(),
        }
    }
}

/// Result type alias for bigscan operations.
pub type Result<T> = std::result::Result<T, ScanError>;

// =============================================================================
// Tests
// =============================================================================
