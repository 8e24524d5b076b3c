//! Machine-readable run summary (JSON).

use serde::Serialize;

use crate::core::scan::ScanResult;
use crate::error::Result;
use crate::render::RunSummary;

/// Schema version of the JSON summary.
pub const SCHEMA_VERSION: &str = "bigscan.v1";

#[derive(Serialize)]
struct SummaryDocument<'a> {
    schema_version: &'static str,
    generated_at: String,
    summary: &'a RunSummary,
    devices: &'a [ScanResult],
}

/// Render the summary and every device record as one JSON document.
///
/// # Errors
///
/// Serialization failure.
pub fn render_summary_json(summary: &RunSummary, results: &[ScanResult]) -> Result<String> {
    let doc = SummaryDocument {
        schema_version: SCHEMA_VERSION,
        generated_at: chrono::Utc::now().to_rfc3339(),
        summary,
        devices: results,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capture::CaptureStatus;
    use crate::error::ScanError;
    use serde_json::Value;
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn json_summary_shape() {
        let mut ok = ScanResult::new("10.0.0.1");
        ok.diagnostic_status = CaptureStatus::TimedOut;
        let mut bad = ScanResult::new("10.0.0.2");
        bad.record_error(&ScanError::AuthRejected {
            host: "10.0.0.2".into(),
            status: 401,
        });
        let results = vec![ok, bad];
        let summary = RunSummary::from_results(
            &results,
            true,
            false,
            Path::new("out.csv"),
            Duration::from_secs(3),
        );

        let json: Value = serde_json::from_str(&render_summary_json(&summary, &results).unwrap())
            .unwrap();
        assert_eq!(json["schema_version"], SCHEMA_VERSION);
        assert_eq!(json["summary"]["devices"], 2);
        assert_eq!(json["summary"]["failed"], 1);
        assert!(json["summary"]["ucs_downloaded"].is_null());
        assert_eq!(json["devices"][0]["management_ip"], "10.0.0.1");
        assert_eq!(json["devices"][0]["diagnostic_status"], "timed_out");
        assert_eq!(json["devices"][1]["error_code"], "BIGSCAN-A002");
    }
}
