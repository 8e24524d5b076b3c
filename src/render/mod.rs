//! Output rendering: result sinks, run summaries, progress and errors.

pub mod csv;
pub mod error;
pub mod human;
pub mod progress;
pub mod robot;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::core::capture::CaptureStatus;
use crate::core::scan::ScanResult;
use crate::error::Result;

pub use self::csv::CsvSink;
pub use progress::ConsoleProgress;

/// Consumer of finished device records.
pub trait ResultSink {
    /// Accept one record. Records arrive in input order.
    fn emit(&mut self, result: &ScanResult) -> Result<()>;

    /// Flush whatever the sink buffers.
    fn finish(&mut self) -> Result<()>;
}

/// Emit every result, then finish the sink.
///
/// # Errors
///
/// The first sink error.
pub fn write_all(sink: &mut dyn ResultSink, results: &[ScanResult]) -> Result<()> {
    for result in results {
        sink.emit(result)?;
    }
    sink.finish()
}

/// Totals for the end-of-run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub devices: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// `None` when QKViews were not requested.
    pub qkviews_downloaded: Option<usize>,
    /// `None` when UCS backups were not requested.
    pub ucs_downloaded: Option<usize>,
    pub output: PathBuf,
    pub elapsed_secs: u64,
}

impl RunSummary {
    #[must_use]
    pub fn from_results(
        results: &[ScanResult],
        qkview_requested: bool,
        ucs_requested: bool,
        output: &Path,
        elapsed: Duration,
    ) -> Self {
        let failed = results.iter().filter(|r| r.is_failure()).count();
        let count = |f: fn(&ScanResult) -> CaptureStatus| {
            results
                .iter()
                .filter(|r| f(r) == CaptureStatus::Success)
                .count()
        };
        Self {
            devices: results.len(),
            succeeded: results.len() - failed,
            failed,
            qkviews_downloaded: qkview_requested.then(|| count(|r| r.diagnostic_status)),
            ucs_downloaded: ucs_requested.then(|| count(|r| r.backup_status)),
            output: output.to_path_buf(),
            elapsed_secs: elapsed.as_secs(),
        }
    }
}

/// Render the end-of-run report.
///
/// # Errors
///
/// JSON serialization failure.
pub fn render_summary(
    summary: &RunSummary,
    results: &[ScanResult],
    format: OutputFormat,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_summary(summary, results, no_color)),
        OutputFormat::Json => robot::render_summary_json(summary, results),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;

    struct Collect(Vec<String>, bool);

    impl ResultSink for Collect {
        fn emit(&mut self, result: &ScanResult) -> Result<()> {
            self.0.push(result.management_ip.clone());
            Ok(())
        }
        fn finish(&mut self) -> Result<()> {
            self.1 = true;
            Ok(())
        }
    }

    fn results() -> Vec<ScanResult> {
        let mut a = ScanResult::new("a");
        a.diagnostic_status = CaptureStatus::Success;
        let mut b = ScanResult::new("b");
        b.diagnostic_status = CaptureStatus::TimedOut;
        b.record_error(&ScanError::NoDevices);
        vec![a, b]
    }

    #[test]
    fn write_all_preserves_order_and_finishes() {
        let mut sink = Collect(Vec::new(), false);
        write_all(&mut sink, &results()).unwrap();
        assert_eq!(sink.0, ["a", "b"]);
        assert!(sink.1);
    }

    #[test]
    fn summary_counts() {
        let summary = RunSummary::from_results(
            &results(),
            true,
            false,
            Path::new("out.csv"),
            Duration::from_secs(75),
        );
        assert_eq!(summary.devices, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.qkviews_downloaded, Some(1));
        assert_eq!(summary.ucs_downloaded, None);
    }
}
