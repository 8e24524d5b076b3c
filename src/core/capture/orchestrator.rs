//! Drives one capture task from submission to remote cleanup.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Local;
use futures::FutureExt;
use serde_json::Value;
use tokio::fs;

use super::download::{DEFAULT_CHUNK_SIZE, artifact_file_name, fetch_chunked};
use super::{CaptureKind, CaptureStatus, CleanupStep, DiagnosticTask, RemoteStatus, TaskState};
use crate::core::session::{Session, SessionManager};
use crate::error::{Result, ScanError};
use crate::util::panic_message;

/// Capture tuning for one kind.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub poll_interval: Duration,
    /// Consecutive transient poll failures tolerated before giving up.
    pub max_poll_retries: u32,
    pub timeout: Duration,
    pub output_dir: PathBuf,
    pub chunk_size: u64,
    /// Download attempts per completed task (first try included).
    pub download_attempts: u32,
}

impl CaptureConfig {
    /// Defaults for `kind`, writing into its usual directory.
    #[must_use]
    pub fn for_kind(kind: CaptureKind) -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            max_poll_retries: 3,
            timeout: kind.default_timeout(),
            output_dir: PathBuf::from(kind.default_dir()),
            chunk_size: DEFAULT_CHUNK_SIZE,
            download_attempts: 2,
        }
    }
}

/// Snapshot handed to observers on every poll that leaves the task running.
#[derive(Debug, Clone)]
pub struct PollTick<'a> {
    pub host: &'a str,
    pub kind: CaptureKind,
    pub task_id: &'a str,
    pub remote_status: &'a str,
    pub elapsed: Duration,
    pub timeout: Duration,
}

/// Progress hook for long polls.
pub trait PollObserver: Send + Sync {
    fn on_tick(&self, tick: &PollTick<'_>);
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PollObserver for NoopObserver {
    fn on_tick(&self, _tick: &PollTick<'_>) {}
}

/// How polling ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed {
        reason: String,
    },
    /// Deadline passed, or polling kept failing (`degraded` holds the last
    /// poll error in that case).
    TimedOut {
        elapsed: Duration,
        degraded: Option<String>,
    },
}

/// Everything the batch layer learns about a capture.
#[derive(Debug)]
pub struct CaptureReport {
    pub kind: CaptureKind,
    pub task_id: Option<String>,
    pub status: CaptureStatus,
    pub final_state: Option<TaskState>,
    pub history: Vec<TaskState>,
    pub local_path: Option<PathBuf>,
    pub error: Option<ScanError>,
    /// Remote cleanup problems; informational only.
    pub cleanup_errors: Vec<String>,
}

impl CaptureReport {
    fn not_submitted(kind: CaptureKind, error: ScanError) -> Self {
        Self {
            kind,
            task_id: None,
            status: CaptureStatus::Failed,
            final_state: None,
            history: Vec::new(),
            local_path: None,
            error: Some(error),
            cleanup_errors: Vec::new(),
        }
    }
}

/// Submits, polls, downloads and cleans up capture tasks of one kind.
#[derive(Debug, Clone)]
pub struct DiagnosticTaskOrchestrator {
    sessions: SessionManager,
    kind: CaptureKind,
    config: CaptureConfig,
}

impl DiagnosticTaskOrchestrator {
    #[must_use]
    pub const fn new(sessions: SessionManager, kind: CaptureKind, config: CaptureConfig) -> Self {
        Self {
            sessions,
            kind,
            config,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> CaptureKind {
        self.kind
    }

    #[must_use]
    pub const fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Full lifecycle: submit, wait, download, clean up.
    ///
    /// Never returns an error: failures are folded into the report. Remote
    /// cleanup runs exactly once for every task the device accepted, on
    /// every path, including a panic while polling or downloading.
    pub async fn run(
        &self,
        session: &mut Session,
        hostname: &str,
        observer: &dyn PollObserver,
    ) -> CaptureReport {
        let mut task = match self.submit(session, hostname).await {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(host = %session.host(), kind = self.kind.name(), error = %e, "Capture not started");
                return CaptureReport::not_submitted(self.kind, e);
            }
        };

        let driven = AssertUnwindSafe(self.drive(session, &mut task, observer))
            .catch_unwind()
            .await;
        let cleanup_errors = self.cleanup(session, &mut task).await;

        let (status, error) = driven.unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            tracing::error!(host = %task.host, task_id = %task.task_id, panic = %message, "Capture aborted");
            (
                CaptureStatus::Failed,
                Some(ScanError::Other(anyhow::anyhow!("capture aborted: {message}"))),
            )
        });

        CaptureReport {
            kind: self.kind,
            task_id: Some(task.task_id.clone()),
            status,
            final_state: Some(task.state()),
            history: task.history().to_vec(),
            local_path: task.local_artifact_path.clone(),
            error,
            cleanup_errors,
        }
    }

    async fn drive(
        &self,
        session: &mut Session,
        task: &mut DiagnosticTask,
        observer: &dyn PollObserver,
    ) -> (CaptureStatus, Option<ScanError>) {
        let outcome = match self
            .await_completion(session, task, self.config.timeout, observer)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return (CaptureStatus::Failed, Some(e)),
        };

        match outcome {
            TaskOutcome::Completed => {
                let mut last_error = None;
                for attempt in 1..=self.config.download_attempts.max(1) {
                    match self.download(session, task).await {
                        Ok(_) => return (CaptureStatus::Success, None),
                        Err(e @ ScanError::SessionExpired { .. }) => {
                            return (CaptureStatus::Failed, Some(e));
                        }
                        Err(e) => {
                            tracing::warn!(
                                host = %task.host,
                                task_id = %task.task_id,
                                attempt,
                                error = %e,
                                "Artifact download failed"
                            );
                            last_error = Some(e);
                        }
                    }
                }
                (CaptureStatus::Failed, last_error)
            }
            TaskOutcome::Failed { reason } => (
                CaptureStatus::Failed,
                Some(ScanError::CaptureFailed {
                    host: task.host.clone(),
                    task_id: task.task_id.clone(),
                    reason,
                }),
            ),
            TaskOutcome::TimedOut {
                degraded: Some(message),
                ..
            } => (
                CaptureStatus::TimedOut,
                Some(ScanError::Poll {
                    host: task.host.clone(),
                    task_id: task.task_id.clone(),
                    attempts: self.config.max_poll_retries.max(1),
                    message,
                }),
            ),
            TaskOutcome::TimedOut { degraded: None, .. } => (
                CaptureStatus::TimedOut,
                Some(ScanError::CaptureTimeout {
                    host: task.host.clone(),
                    task_id: task.task_id.clone(),
                    seconds: self.config.timeout.as_secs(),
                }),
            ),
        }
    }

    /// Ask the device to start a capture named after `hostname`.
    ///
    /// # Errors
    ///
    /// [`ScanError::TaskSubmission`] if the device rejects the job or the
    /// reply carries no task id; session and network errors pass through.
    pub async fn submit(&self, session: &Session, hostname: &str) -> Result<DiagnosticTask> {
        let name = artifact_file_name(hostname, &Local::now(), self.kind.extension());
        tracing::info!(
            host = %session.host(),
            kind = self.kind.name(),
            artifact = %name,
            "Submitting capture task"
        );

        let reply = session
            .post_json(self.kind.collection_path(), &self.kind.create_body(&name))
            .await
            .map_err(|e| self.submission_error(session, e))?;
        let task_id = self
            .kind
            .task_id_from(&reply)
            .ok_or_else(|| ScanError::TaskSubmission {
                host: session.host().to_string(),
                kind: self.kind.name(),
                message: "response carries no task id".to_string(),
            })?;
        let mut task = DiagnosticTask::new(self.kind, session.host(), task_id, name);

        if let Some((path, body)) = self.kind.start_request(&task.task_id) {
            if let Err(e) = session.put_json(&path, &body).await {
                let err = self.submission_error(session, e);
                task.failure_reason = Some(err.to_string());
                task.transition(TaskState::Failed)?;
                self.cleanup(session, &mut task).await;
                return Err(err);
            }
        }

        tracing::debug!(host = %task.host, task_id = %task.task_id, "Capture task accepted");
        Ok(task)
    }

    fn submission_error(&self, session: &Session, err: ScanError) -> ScanError {
        let message = match err {
            ScanError::DeviceApi {
                status, message, ..
            } => format!("HTTP {status}: {message}"),
            ScanError::ParseResponse { message, .. } => message,
            other => return other,
        };
        ScanError::TaskSubmission {
            host: session.host().to_string(),
            kind: self.kind.name(),
            message,
        }
    }

    /// Poll until the task completes, fails, or `timeout` (measured from
    /// submission) passes. Keeps the session alive throughout.
    ///
    /// Transient poll failures are retried; after `max_poll_retries` in a row
    /// the task is treated as timed out with the last error attached.
    ///
    /// # Errors
    ///
    /// [`ScanError::SessionExpired`] and non-transient API errors.
    pub async fn await_completion(
        &self,
        session: &mut Session,
        task: &mut DiagnosticTask,
        timeout: Duration,
        observer: &dyn PollObserver,
    ) -> Result<TaskOutcome> {
        let deadline = task.started() + timeout;
        task.deadline = Some(deadline);
        let status_path = self.kind.status_path(&task.task_id);
        let max_errors = self.config.max_poll_retries.max(1);
        let mut poll_errors: u32 = 0;

        self.sessions.extend(session).await;

        loop {
            if Instant::now() >= deadline {
                return Self::time_out(task, None);
            }
            self.sessions.keep_alive(session).await;

            match session.get_json(&status_path).await {
                Ok(body) => {
                    poll_errors = 0;
                    if task.state() == TaskState::Submitted {
                        task.transition(TaskState::Running)?;
                    }
                    match self.kind.parse_status(&body) {
                        RemoteStatus::Succeeded => {
                            task.remote_artifact_path =
                                Some(self.kind.download_path(&body, &task.artifact_name));
                            task.transition(TaskState::Completed)?;
                            tracing::info!(
                                host = %task.host,
                                task_id = %task.task_id,
                                elapsed_secs = task.elapsed().as_secs(),
                                "Capture task completed"
                            );
                            return Ok(TaskOutcome::Completed);
                        }
                        RemoteStatus::Failed(reason) => {
                            tracing::warn!(host = %task.host, task_id = %task.task_id, reason = %reason, "Capture task failed on device");
                            task.failure_reason = Some(reason.clone());
                            task.transition(TaskState::Failed)?;
                            return Ok(TaskOutcome::Failed { reason });
                        }
                        status => {
                            if let RemoteStatus::Unknown(raw) = &status {
                                tracing::debug!(host = %task.host, status = %raw, "Unrecognised task status");
                            }
                            observer.on_tick(&PollTick {
                                host: &task.host,
                                kind: self.kind,
                                task_id: &task.task_id,
                                remote_status: status.label(),
                                elapsed: task.elapsed(),
                                timeout,
                            });
                        }
                    }
                }
                Err(e @ ScanError::SessionExpired { .. }) => return Err(e),
                Err(e) if e.is_retryable() => {
                    poll_errors += 1;
                    tracing::warn!(
                        host = %task.host,
                        task_id = %task.task_id,
                        attempt = poll_errors,
                        error = %e,
                        "Status poll failed"
                    );
                    if poll_errors >= max_errors {
                        return Self::time_out(task, Some(e.to_string()));
                    }
                }
                Err(e) => return Err(e),
            }

            let next_poll = (Instant::now() + self.config.poll_interval).min(deadline);
            self.rest_until(session, next_poll).await;
        }
    }

    /// Sleep until `wake`, waking early whenever a keep-alive falls due.
    async fn rest_until(&self, session: &mut Session, wake: Instant) {
        loop {
            let now = Instant::now();
            if now >= wake {
                return;
            }
            let mut nap = wake - now;
            let until_refresh = self.sessions.until_refresh(session, now);
            if until_refresh.is_zero() {
                self.sessions.keep_alive(session).await;
                if !self.sessions.until_refresh(session, Instant::now()).is_zero() {
                    continue;
                }
                // Extension failed; retry on the next poll.
            } else {
                nap = nap.min(until_refresh);
            }
            tokio::time::sleep(nap).await;
        }
    }

    fn time_out(task: &mut DiagnosticTask, degraded: Option<String>) -> Result<TaskOutcome> {
        task.transition(TaskState::TimedOut)?;
        let elapsed = task.elapsed();
        tracing::warn!(
            host = %task.host,
            task_id = %task.task_id,
            elapsed_secs = elapsed.as_secs(),
            degraded = degraded.is_some(),
            "Capture task timed out"
        );
        Ok(TaskOutcome::TimedOut { elapsed, degraded })
    }

    /// Transfer the finished artifact into the output directory.
    ///
    /// # Errors
    ///
    /// [`ScanError::InvalidTransition`] unless the task is COMPLETED;
    /// [`ScanError::Download`] (task stays COMPLETED) on transfer failure;
    /// [`ScanError::SessionExpired`] if the token lapses mid-transfer.
    pub async fn download(
        &self,
        session: &mut Session,
        task: &mut DiagnosticTask,
    ) -> Result<PathBuf> {
        if task.state() != TaskState::Completed {
            return Err(ScanError::InvalidTransition {
                from: task.state(),
                to: TaskState::Downloading,
            });
        }
        let remote = task
            .remote_artifact_path
            .clone()
            .unwrap_or_else(|| self.kind.download_path(&Value::Null, &task.artifact_name));
        let dest = self.config.output_dir.join(&task.artifact_name);

        self.sessions.keep_alive(session).await;
        task.transition(TaskState::Downloading)?;

        let result = match fs::create_dir_all(&self.config.output_dir).await {
            Ok(()) => fetch_chunked(session, &remote, &dest, self.config.chunk_size).await,
            Err(e) => Err(ScanError::Download {
                host: task.host.clone(),
                message: format!("cannot create {}: {e}", self.config.output_dir.display()),
            }),
        };

        match result {
            Ok(bytes) => {
                task.local_artifact_path = Some(dest.clone());
                task.transition(TaskState::Downloaded)?;
                tracing::info!(host = %task.host, path = %dest.display(), bytes, "Artifact downloaded");
                Ok(dest)
            }
            Err(e) => {
                task.transition(TaskState::Completed)?;
                Err(match e {
                    ScanError::SessionExpired { .. } | ScanError::Download { .. } => e,
                    other => ScanError::Download {
                        host: task.host.clone(),
                        message: other.to_string(),
                    },
                })
            }
        }
    }

    /// Remove the remote job and its staged file, then mark the task
    /// CLEANED_UP. Failures are logged and returned as text, never raised.
    /// A task that is already CLEANED_UP is left alone.
    pub async fn cleanup(&self, session: &Session, task: &mut DiagnosticTask) -> Vec<String> {
        if task.state() == TaskState::CleanedUp {
            tracing::debug!(host = %task.host, task_id = %task.task_id, "Task already cleaned up");
            return Vec::new();
        }
        if let Err(e) = task.settle("interrupted before completion") {
            tracing::error!(host = %task.host, error = %e, "Cannot settle task before cleanup");
        }

        let mut errors = Vec::new();
        for step in self.kind.cleanup_steps(&task.task_id, &task.artifact_name) {
            let result = match &step {
                CleanupStep::Delete(path) => session.delete(path).await,
                CleanupStep::Post(path, body) => session.post_json(path, body).await.map(|_| ()),
            };
            if let Err(e) = result {
                let err = ScanError::Cleanup {
                    host: task.host.clone(),
                    task_id: task.task_id.clone(),
                    message: e.to_string(),
                };
                tracing::warn!(host = %task.host, step = ?step, error = %err, "Remote cleanup step failed");
                errors.push(err.to_string());
            }
        }

        match task.transition(TaskState::CleanedUp) {
            Ok(()) => tracing::debug!(
                host = %task.host,
                task_id = %task.task_id,
                failures = errors.len(),
                "Capture task cleaned up"
            ),
            Err(e) => tracing::error!(host = %task.host, error = %e, "Task not marked cleaned up"),
        }
        errors
    }
}
