//! Batch scanning across a device list.
//!
//! Devices are scanned one at a time, in input order. Each device goes
//! through resolve → open → extract → captures → close, and every device
//! produces exactly one [`ScanResult`] no matter how far it got. A session
//! that was opened is always closed, including when extraction or a capture
//! panics.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use futures::FutureExt;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::core::capture::{CaptureKind, CaptureReport, CaptureStatus, DiagnosticTaskOrchestrator, PollObserver};
use crate::core::credentials::CredentialResolver;
use crate::core::device::Device;
use crate::core::extract::{DeviceFields, FieldExtractor, NOT_AVAILABLE};
use crate::core::session::{Session, SessionManager};
use crate::error::ScanError;
use crate::util::panic_message;

/// Default pause between devices.
pub const DEFAULT_PACING: Duration = Duration::from_secs(2);

/// A device plus whatever credentials its input row carried.
#[derive(Clone)]
pub struct ScanTarget {
    pub device: Device,
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
    /// 1-based line in the input file, when read from one.
    pub line: Option<usize>,
}

impl ScanTarget {
    /// Target with no row credentials.
    #[must_use]
    pub const fn bare(device: Device) -> Self {
        Self {
            device,
            username: None,
            password: None,
            line: None,
        }
    }
}

impl std::fmt::Debug for ScanTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanTarget")
            .field("device", &self.device.host())
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("line", &self.line)
            .finish()
    }
}

/// Outcome for one device.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub management_ip: String,
    pub fields: DeviceFields,
    pub diagnostic_status: CaptureStatus,
    pub diagnostic_file: Option<PathBuf>,
    pub backup_status: CaptureStatus,
    pub backup_file: Option<PathBuf>,
    pub error: Option<String>,
    pub error_code: Option<&'static str>,
    /// First suggested fix command for the recorded error.
    pub hint: Option<String>,
    /// Non-fatal problems: failed keep-alives, leftover remote files.
    pub warnings: Vec<String>,
    pub extracted_at: DateTime<Local>,
}

impl ScanResult {
    #[must_use]
    pub fn new(management_ip: impl Into<String>) -> Self {
        Self {
            management_ip: management_ip.into(),
            fields: DeviceFields::new(),
            diagnostic_status: CaptureStatus::NotRequested,
            diagnostic_file: None,
            backup_status: CaptureStatus::NotRequested,
            backup_file: None,
            error: None,
            error_code: None,
            hint: None,
            warnings: Vec::new(),
            extracted_at: Local::now(),
        }
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Field value, `N/A` when absent.
    #[must_use]
    pub fn field(&self, column: &str) -> &str {
        self.fields.get(column).map_or(NOT_AVAILABLE, String::as_str)
    }

    /// Record an error. The first error's code and hint are kept; messages
    /// accumulate.
    pub fn record_error(&mut self, err: &ScanError) {
        if self.error_code.is_none() {
            self.error_code = Some(err.error_code());
            self.hint = err
                .fix_suggestions()
                .into_iter()
                .flat_map(|s| s.commands)
                .find(|c| !c.starts_with('#'));
        }
        let message = err.to_string();
        self.error = Some(match self.error.take() {
            Some(prior) => format!("{prior}; {message}"),
            None => message,
        });
    }

    fn apply_capture(&mut self, report: &CaptureReport) {
        match report.kind {
            CaptureKind::QkView => {
                self.diagnostic_status = report.status;
                self.diagnostic_file.clone_from(&report.local_path);
            }
            CaptureKind::Ucs => {
                self.backup_status = report.status;
                self.backup_file.clone_from(&report.local_path);
            }
        }
        self.warnings.extend(report.cleanup_errors.iter().cloned());
    }
}

/// Progress hooks for a batch. Also receives poll ticks during captures.
pub trait ScanObserver: PollObserver {
    fn device_started(&self, _index: usize, _total: usize, _host: &str) {}
    fn phase(&self, _host: &str, _phase: &str) {}
    fn device_finished(&self, _index: usize, _total: usize, _result: &ScanResult) {}
}

impl ScanObserver for crate::core::capture::NoopObserver {}

/// Runs the per-device pipeline over a list of targets.
pub struct DeviceScanOrchestrator<'a> {
    sessions: SessionManager,
    resolver: CredentialResolver<'a>,
    extractor: Box<dyn FieldExtractor>,
    captures: Vec<DiagnosticTaskOrchestrator>,
    pacing: Duration,
}

impl<'a> DeviceScanOrchestrator<'a> {
    #[must_use]
    pub fn new(
        sessions: SessionManager,
        resolver: CredentialResolver<'a>,
        extractor: Box<dyn FieldExtractor>,
    ) -> Self {
        Self {
            sessions,
            resolver,
            extractor,
            captures: Vec::new(),
            pacing: DEFAULT_PACING,
        }
    }

    /// Add a capture step. Captures run in the order added.
    #[must_use]
    pub fn with_capture(mut self, capture: DiagnosticTaskOrchestrator) -> Self {
        self.captures.push(capture);
        self
    }

    #[must_use]
    pub const fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Columns the extractor fills, for sinks that need a fixed header.
    #[must_use]
    pub fn field_columns(&self) -> Vec<&'static str> {
        self.extractor.columns().to_vec()
    }

    /// Scan every target in order. Returns one result per target.
    pub async fn run(&self, targets: &[ScanTarget], observer: &dyn ScanObserver) -> Vec<ScanResult> {
        let total = targets.len();
        let mut results = Vec::with_capacity(total);

        for (index, target) in targets.iter().enumerate() {
            observer.device_started(index, total, target.device.host());
            let result = self.scan_device(target, observer).await;
            observer.device_finished(index, total, &result);
            results.push(result);

            if index + 1 < total && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        let failed = results.iter().filter(|r| r.is_failure()).count();
        tracing::info!(devices = total, failed, "Scan finished");
        results
    }

    /// Scan one device. Never fails: errors are recorded on the result.
    pub async fn scan_device(&self, target: &ScanTarget, observer: &dyn ScanObserver) -> ScanResult {
        let host = target.device.host();
        let mut result = ScanResult::new(host);

        let credential = match self.resolver.resolve(
            host,
            target.username.as_deref(),
            target.password.as_ref().map(|p| p.as_str()),
        ) {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(host, error = %e, "Skipping device");
                result.record_error(&e);
                return result;
            }
        };

        observer.phase(host, "login");
        let mut session = match self.sessions.open(&target.device, &credential).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(host, code = e.error_code(), error = %e, "Login failed");
                result.record_error(&e);
                return result;
            }
        };
        drop(credential);

        let work = AssertUnwindSafe(self.work(&mut session, &mut result, observer))
            .catch_unwind()
            .await;

        if session.extension_failures() > 0 {
            result.warnings.push(format!(
                "{} session extension(s) failed: {}",
                session.extension_failures(),
                session.last_extension_error().unwrap_or("unknown error")
            ));
        }
        observer.phase(host, "logout");
        self.sessions.close(session).await;

        match work {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(host, code = e.error_code(), error = %e, "Device scan failed");
                result.record_error(&e);
            }
            Err(panic) => {
                let err = ScanError::Other(anyhow::anyhow!(
                    "device scan aborted: {}",
                    panic_message(panic.as_ref())
                ));
                tracing::error!(host, error = %err, "Device scan panicked");
                result.record_error(&err);
            }
        }
        result
    }

    async fn work(
        &self,
        session: &mut Session,
        result: &mut ScanResult,
        observer: &dyn ScanObserver,
    ) -> Result<(), ScanError> {
        let host = session.host().to_string();

        observer.phase(&host, "extract");
        result.fields = self.extractor.extract(session).await?;
        result.extracted_at = Local::now();

        let label = result
            .fields
            .get("hostname")
            .filter(|h| h.as_str() != NOT_AVAILABLE)
            .cloned()
            .unwrap_or_else(|| host.clone());

        for capture in &self.captures {
            observer.phase(&host, capture.kind().label());
            let report = capture.run(session, &label, observer).await;
            result.apply_capture(&report);
            match report.error {
                Some(e @ ScanError::SessionExpired { .. }) => return Err(e),
                Some(e) => result.record_error(&e),
                None => {}
            }
        }
        Ok(())
    }
}
