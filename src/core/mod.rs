//! Scan engine: credentials, sessions, capture tasks, extraction, batches.

pub mod capture;
pub mod credentials;
pub mod device;
pub mod extract;
pub mod http;
pub mod logging;
pub mod scan;
pub mod session;

pub use capture::{
    CaptureConfig, CaptureKind, CaptureReport, CaptureStatus, DiagnosticTask,
    DiagnosticTaskOrchestrator, PollObserver, PollTick, TaskState,
};
pub use credentials::{Credential, CredentialResolver, FallbackCredentials, Prompter};
pub use device::Device;
pub use extract::{FieldExtractor, StandardExtractor};
pub use scan::{DeviceScanOrchestrator, ScanObserver, ScanResult, ScanTarget};
pub use session::{Session, SessionConfig, SessionManager};
