//! Result CSV output.
//!
//! Column order is fixed: `management_ip`, the extractor's columns, capture
//! status and file columns, `error`, `extraction_timestamp`. Missing values
//! are written as `N/A`; the error cell is empty for a clean device.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::core::extract::NOT_AVAILABLE;
use crate::core::scan::ScanResult;
use crate::error::Result;
use crate::render::ResultSink;
use crate::util::time::record_stamp;

const TRAILING_COLUMNS: &[&str] = &[
    "qkview_downloaded",
    "qkview_file",
    "ucs_downloaded",
    "ucs_file",
    "error",
    "extraction_timestamp",
];

/// Writes one CSV row per result.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    field_columns: Vec<String>,
    rows: usize,
}

impl CsvSink<File> {
    /// Create (or truncate) `path` and write the header.
    ///
    /// # Errors
    ///
    /// The file cannot be created or the header cannot be written.
    pub fn create(path: &Path, field_columns: &[&str]) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::new(File::create(path)?, field_columns)
    }
}

impl<W: Write> CsvSink<W> {
    /// Wrap a writer and write the header.
    ///
    /// # Errors
    ///
    /// The header cannot be written.
    pub fn new(inner: W, field_columns: &[&str]) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        let header = std::iter::once("management_ip")
            .chain(field_columns.iter().copied())
            .chain(TRAILING_COLUMNS.iter().copied());
        writer.write_record(header)?;
        Ok(Self {
            writer,
            field_columns: field_columns.iter().map(ToString::to_string).collect(),
            rows: 0,
        })
    }

    /// Rows written so far, header excluded.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Consume the sink and return the inner writer.
    ///
    /// # Errors
    ///
    /// Buffered rows cannot be flushed.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::error::ScanError::Io(e.into_error()))
    }

    fn row(&self, result: &ScanResult) -> Vec<String> {
        let path_cell = |path: Option<&Path>| {
            path.map_or_else(|| NOT_AVAILABLE.to_string(), |p| p.display().to_string())
        };

        let mut row = Vec::with_capacity(self.field_columns.len() + TRAILING_COLUMNS.len() + 1);
        row.push(result.management_ip.clone());
        row.extend(self.field_columns.iter().map(|c| result.field(c).to_string()));
        row.push(result.diagnostic_status.to_string());
        row.push(path_cell(result.diagnostic_file.as_deref()));
        row.push(result.backup_status.to_string());
        row.push(path_cell(result.backup_file.as_deref()));
        row.push(result.error.clone().unwrap_or_default());
        row.push(record_stamp(&result.extracted_at));
        row
    }
}

impl<W: Write> ResultSink for CsvSink<W> {
    fn emit(&mut self, result: &ScanResult) -> Result<()> {
        let row = self.row(result);
        self.writer.write_record(&row)?;
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        tracing::debug!(rows = self.rows, "Result CSV flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capture::CaptureStatus;
    use crate::error::ScanError;
    use std::path::PathBuf;

    fn written(sink: CsvSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn header_only_when_nothing_emitted() {
        let mut sink = CsvSink::new(Vec::new(), &["hostname", "platform"]).unwrap();
        sink.finish().unwrap();
        assert_eq!(
            written(sink).trim_end(),
            "management_ip,hostname,platform,qkview_downloaded,qkview_file,\
             ucs_downloaded,ucs_file,error,extraction_timestamp"
        );
    }

    #[test]
    fn rows_follow_column_order() {
        let mut ok = ScanResult::new("10.0.0.1");
        ok.fields.insert("hostname".into(), "bigip1.lab".into());
        ok.diagnostic_status = CaptureStatus::Success;
        ok.diagnostic_file = Some(PathBuf::from("QKViews/bigip1.lab_20240101_000000.qkview"));

        let mut failed = ScanResult::new("10.0.0.2");
        failed.record_error(&ScanError::AuthRejected {
            host: "10.0.0.2".into(),
            status: 401,
        });

        let mut sink = CsvSink::new(Vec::new(), &["hostname"]).unwrap();
        sink.emit(&ok).unwrap();
        sink.emit(&failed).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.rows(), 2);

        let text = written(sink);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with(
            "10.0.0.1,bigip1.lab,Yes,QKViews/bigip1.lab_20240101_000000.qkview,Not requested,N/A,,"
        ));
        assert!(lines[2].starts_with("10.0.0.2,N/A,Not requested,N/A,Not requested,N/A,"));
        assert!(lines[2].contains("401"));
    }

    #[test]
    fn create_makes_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("devices.csv");
        let mut sink = CsvSink::create(&path, &["hostname"]).unwrap();
        sink.finish().unwrap();
        assert!(path.exists());
    }
}
