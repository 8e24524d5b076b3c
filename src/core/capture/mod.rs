//! Asynchronous capture jobs: QKView diagnostics and UCS backups.
//!
//! Both are long-running device tasks driven by the same lifecycle:
//!
//! ```text
//! SUBMITTED -> RUNNING -> COMPLETED -> DOWNLOADING -> DOWNLOADED -> CLEANED_UP
//!                      \-> FAILED ------------------------------/
//!                      \-> TIMED_OUT --------------------------/
//! ```
//!
//! A failed download returns the task from DOWNLOADING to COMPLETED. Every
//! task reaches CLEANED_UP; that is the only state callers ever see at the
//! end of [`DiagnosticTaskOrchestrator::run`].

pub mod download;
pub mod orchestrator;

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use reqwest::Url;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::{Result, ScanError};

pub use download::artifact_file_name;
pub use orchestrator::{
    CaptureConfig, CaptureReport, DiagnosticTaskOrchestrator, NoopObserver, PollObserver,
    PollTick, TaskOutcome,
};

// =============================================================================
// Task state
// =============================================================================

/// Lifecycle state of a capture task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Submitted,
    Running,
    Completed,
    Failed,
    TimedOut,
    Downloading,
    Downloaded,
    CleanedUp,
}

impl TaskState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::TimedOut => "TIMED_OUT",
            Self::Downloading => "DOWNLOADING",
            Self::Downloaded => "DOWNLOADED",
            Self::CleanedUp => "CLEANED_UP",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Submitted, Self::Running | Self::Failed | Self::TimedOut)
                | (Self::Running, Self::Completed | Self::Failed | Self::TimedOut)
                | (Self::Completed, Self::Downloading | Self::CleanedUp)
                | (Self::Downloading, Self::Downloaded | Self::Completed)
                | (
                    Self::Downloaded | Self::Failed | Self::TimedOut,
                    Self::CleanedUp
                )
        )
    }

    /// The device has stopped working on the task.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Submitted | Self::Running)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Remote status
// =============================================================================

/// Task status as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Still working; carries the raw status word.
    Pending(String),
    Succeeded,
    Failed(String),
    /// A status word we do not recognise. Polling continues.
    Unknown(String),
}

impl RemoteStatus {
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Pending(s) | Self::Unknown(s) => s,
            Self::Succeeded => "SUCCEEDED",
            Self::Failed(_) => "FAILED",
        }
    }
}

fn failure_reason(body: &Value) -> String {
    ["message", "_taskError", "errorMessage"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .unwrap_or("device reported failure")
        .to_string()
}

// =============================================================================
// Capture kinds
// =============================================================================

/// Which artifact a task produces. Each kind knows its REST vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    /// Diagnostic snapshot (`.qkview`).
    QkView,
    /// Configuration backup (`.ucs`).
    Ucs,
}

/// A remote cleanup call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStep {
    Delete(String),
    Post(String, Value),
}

const QKVIEW_TASKS: &str = "/mgmt/cm/autodeploy/qkview";
const QKVIEW_DOWNLOADS: &str = "/mgmt/cm/autodeploy/qkview-download";
const UCS_TASKS: &str = "/mgmt/tm/task/sys/ucs";
const UCS_DOWNLOADS: &str = "/mgmt/shared/file-transfer/ucs-downloads";
const UCS_FILES: &str = "/mgmt/tm/sys/ucs";
const UNIX_RM: &str = "/mgmt/tm/util/unix-rm";

impl CaptureKind {
    /// Name used in logs and error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::QkView => "qkview",
            Self::Ucs => "ucs",
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::QkView => "QKView",
            Self::Ucs => "UCS",
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        self.name()
    }

    /// Job collection endpoint; also the create endpoint.
    #[must_use]
    pub const fn collection_path(self) -> &'static str {
        match self {
            Self::QkView => QKVIEW_TASKS,
            Self::Ucs => UCS_TASKS,
        }
    }

    #[must_use]
    pub fn create_body(self, artifact_name: &str) -> Value {
        match self {
            Self::QkView => json!({ "name": artifact_name }),
            Self::Ucs => json!({ "command": "save", "name": artifact_name }),
        }
    }

    /// Pull the task id out of the create response.
    #[must_use]
    pub fn task_id_from(self, body: &Value) -> Option<String> {
        let key = match self {
            Self::QkView => "id",
            Self::Ucs => "_taskId",
        };
        body.get(key)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    /// UCS tasks are created idle and must be started explicitly.
    #[must_use]
    pub fn start_request(self, task_id: &str) -> Option<(String, Value)> {
        match self {
            Self::QkView => None,
            Self::Ucs => Some((
                self.status_path(task_id),
                json!({ "_taskState": "VALIDATING" }),
            )),
        }
    }

    #[must_use]
    pub fn status_path(self, task_id: &str) -> String {
        format!("{}/{task_id}", self.collection_path())
    }

    /// Parse a poll response.
    #[must_use]
    pub fn parse_status(self, body: &Value) -> RemoteStatus {
        let key = match self {
            Self::QkView => "status",
            Self::Ucs => "_taskState",
        };
        let raw = body
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_ascii_uppercase();
        match (self, raw.as_str()) {
            (Self::QkView, "SUCCEEDED") | (Self::Ucs, "COMPLETED") => RemoteStatus::Succeeded,
            (_, "FAILED") => RemoteStatus::Failed(failure_reason(body)),
            (Self::QkView, "IN_PROGRESS" | "CREATED")
            | (Self::Ucs, "CREATED" | "STARTED" | "VALIDATING" | "RUNNING") => {
                RemoteStatus::Pending(raw)
            }
            _ => RemoteStatus::Unknown(raw),
        }
    }

    /// Download endpoint for a finished task.
    ///
    /// QKView status bodies carry a `qkviewUri`; only its path is used since
    /// the device reports its own internal hostname there.
    #[must_use]
    pub fn download_path(self, status_body: &Value, artifact_name: &str) -> String {
        match self {
            Self::QkView => status_body
                .get("qkviewUri")
                .and_then(Value::as_str)
                .and_then(|uri| {
                    if uri.starts_with('/') {
                        Some(uri.to_string())
                    } else {
                        Url::parse(uri).ok().map(|u| u.path().to_string())
                    }
                })
                .filter(|p| p.len() > 1)
                .unwrap_or_else(|| format!("{QKVIEW_DOWNLOADS}/{artifact_name}")),
            Self::Ucs => format!("{UCS_DOWNLOADS}/{artifact_name}"),
        }
    }

    /// Where the device stages the artifact on its own disk.
    #[must_use]
    pub fn remote_file(self, artifact_name: &str) -> String {
        match self {
            Self::QkView => format!("/var/tmp/{artifact_name}"),
            Self::Ucs => format!("/var/local/ucs/{artifact_name}"),
        }
    }

    /// Calls that remove the job and its staged artifact.
    #[must_use]
    pub fn cleanup_steps(self, task_id: &str, artifact_name: &str) -> Vec<CleanupStep> {
        let remove_job = CleanupStep::Delete(self.status_path(task_id));
        let remove_file = match self {
            Self::QkView => CleanupStep::Post(
                UNIX_RM.to_string(),
                json!({ "command": "run", "utilCmdArgs": self.remote_file(artifact_name) }),
            ),
            Self::Ucs => CleanupStep::Delete(format!("{UCS_FILES}/{artifact_name}")),
        };
        vec![remove_job, remove_file]
    }

    /// Default completion timeout.
    #[must_use]
    pub const fn default_timeout(self) -> Duration {
        match self {
            Self::QkView => Duration::from_secs(1200),
            Self::Ucs => Duration::from_secs(900),
        }
    }

    /// Default local directory for artifacts.
    #[must_use]
    pub const fn default_dir(self) -> &'static str {
        match self {
            Self::QkView => "QKViews",
            Self::Ucs => "UCS",
        }
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Capture status (what the batch layer sees)
// =============================================================================

/// Per-device outcome of a capture, as written to results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    #[default]
    NotRequested,
    Success,
    Failed,
    TimedOut,
}

impl CaptureStatus {
    /// Column value in the result CSV.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotRequested => "Not requested",
            Self::Success => "Yes",
            Self::Failed => "Failed",
            Self::TimedOut => "Timed out",
        }
    }
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Diagnostic task
// =============================================================================

/// One capture job on one device. Owned by the orchestrator for the
/// duration of [`DiagnosticTaskOrchestrator::run`].
#[derive(Debug)]
pub struct DiagnosticTask {
    pub task_id: String,
    pub kind: CaptureKind,
    pub host: String,
    state: TaskState,
    pub created_at: DateTime<Local>,
    started: Instant,
    pub deadline: Option<Instant>,
    /// File name used both on the device and locally.
    pub artifact_name: String,
    /// Download endpoint, known once the task completes.
    pub remote_artifact_path: Option<String>,
    pub local_artifact_path: Option<PathBuf>,
    pub failure_reason: Option<String>,
    history: Vec<TaskState>,
}

impl DiagnosticTask {
    #[must_use]
    pub fn new(
        kind: CaptureKind,
        host: impl Into<String>,
        task_id: impl Into<String>,
        artifact_name: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            host: host.into(),
            state: TaskState::Submitted,
            created_at: Local::now(),
            started: Instant::now(),
            deadline: None,
            artifact_name: artifact_name.into(),
            remote_artifact_path: None,
            local_artifact_path: None,
            failure_reason: None,
            history: vec![TaskState::Submitted],
        }
    }

    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    /// States visited so far, oldest first.
    #[must_use]
    pub fn history(&self) -> &[TaskState] {
        &self.history
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    #[must_use]
    pub const fn started(&self) -> Instant {
        self.started
    }

    /// Move to `next`, rejecting moves the lifecycle does not allow.
    ///
    /// # Errors
    ///
    /// [`ScanError::InvalidTransition`] for an illegal move; the state is
    /// left unchanged.
    pub fn transition(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ScanError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(
            host = %self.host,
            kind = self.kind.name(),
            task_id = %self.task_id,
            from = %self.state,
            to = %next,
            "Task state change"
        );
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Walk the task to a state from which CLEANED_UP is legal.
    ///
    /// # Errors
    ///
    /// Propagates [`ScanError::InvalidTransition`]; cannot happen for states
    /// reachable through [`DiagnosticTask::transition`].
    pub fn settle(&mut self, reason: &str) -> Result<()> {
        match self.state {
            TaskState::Submitted | TaskState::Running => {
                self.failure_reason.get_or_insert_with(|| reason.to_string());
                self.transition(TaskState::Failed)
            }
            TaskState::Downloading => self.transition(TaskState::Completed),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_legal() {
        let mut task = DiagnosticTask::new(CaptureKind::QkView, "h", "1", "h_x.qkview");
        for next in [
            TaskState::Running,
            TaskState::Completed,
            TaskState::Downloading,
            TaskState::Downloaded,
            TaskState::CleanedUp,
        ] {
            task.transition(next).unwrap();
        }
        assert_eq!(task.history().len(), 6);
    }

    #[test]
    fn illegal_transition_is_rejected_and_state_kept() {
        let mut task = DiagnosticTask::new(CaptureKind::QkView, "h", "1", "n");
        let err = task.transition(TaskState::Downloaded).unwrap_err();
        assert!(matches!(
            err,
            ScanError::InvalidTransition { from: TaskState::Submitted, to: TaskState::Downloaded }
        ));
        assert_eq!(task.state(), TaskState::Submitted);
    }

    #[test]
    fn cleaned_up_is_final() {
        for next in [
            TaskState::Submitted,
            TaskState::Running,
            TaskState::Completed,
            TaskState::CleanedUp,
        ] {
            assert!(!TaskState::CleanedUp.can_transition_to(next));
        }
        assert!(!TaskState::Running.can_transition_to(TaskState::CleanedUp));
    }

    #[test]
    fn failed_download_returns_to_completed() {
        assert!(TaskState::Downloading.can_transition_to(TaskState::Completed));
        assert!(TaskState::Completed.can_transition_to(TaskState::CleanedUp));
    }

    #[test]
    fn settle_marks_running_tasks_failed() {
        let mut task = DiagnosticTask::new(CaptureKind::Ucs, "h", "1", "n");
        task.transition(TaskState::Running).unwrap();
        task.settle("session expired").unwrap();
        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(task.failure_reason.as_deref(), Some("session expired"));
        task.transition(TaskState::CleanedUp).unwrap();
    }

    #[test]
    fn qkview_status_parsing() {
        let k = CaptureKind::QkView;
        assert_eq!(k.parse_status(&json!({"status": "IN_PROGRESS"})), RemoteStatus::Pending("IN_PROGRESS".into()));
        assert_eq!(k.parse_status(&json!({"status": "SUCCEEDED"})), RemoteStatus::Succeeded);
        assert_eq!(
            k.parse_status(&json!({"status": "FAILED", "message": "disk full"})),
            RemoteStatus::Failed("disk full".into())
        );
        assert_eq!(k.parse_status(&json!({"status": "WEIRD"})), RemoteStatus::Unknown("WEIRD".into()));
        assert_eq!(k.parse_status(&json!({})), RemoteStatus::Unknown(String::new()));
    }

    #[test]
    fn ucs_status_parsing() {
        let k = CaptureKind::Ucs;
        assert_eq!(k.parse_status(&json!({"_taskState": "VALIDATING"})), RemoteStatus::Pending("VALIDATING".into()));
        assert_eq!(k.parse_status(&json!({"_taskState": "COMPLETED"})), RemoteStatus::Succeeded);
        assert!(matches!(k.parse_status(&json!({"_taskState": "FAILED"})), RemoteStatus::Failed(_)));
    }

    #[test]
    fn qkview_download_path_uses_uri_path() {
        let body = json!({"qkviewUri": "https://localhost/mgmt/cm/autodeploy/qkview-download/a.qkview"});
        assert_eq!(
            CaptureKind::QkView.download_path(&body, "ignored"),
            "/mgmt/cm/autodeploy/qkview-download/a.qkview"
        );
        assert_eq!(
            CaptureKind::QkView.download_path(&json!({}), "b.qkview"),
            "/mgmt/cm/autodeploy/qkview-download/b.qkview"
        );
    }

    #[test]
    fn ucs_cleanup_removes_task_and_file() {
        let steps = CaptureKind::Ucs.cleanup_steps("42", "h_x.ucs");
        assert_eq!(
            steps,
            vec![
                CleanupStep::Delete("/mgmt/tm/task/sys/ucs/42".into()),
                CleanupStep::Delete("/mgmt/tm/sys/ucs/h_x.ucs".into()),
            ]
        );
    }

    #[test]
    fn capture_status_column_values() {
        assert_eq!(CaptureStatus::NotRequested.to_string(), "Not requested");
        assert_eq!(CaptureStatus::Success.to_string(), "Yes");
        assert_eq!(CaptureStatus::Failed.to_string(), "Failed");
        assert_eq!(CaptureStatus::TimedOut.to_string(), "Timed out");
    }
}
