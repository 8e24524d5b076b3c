//! Device list input.
//!
//! One device per row: `ip,username,password`. Username and password are
//! optional; blank cells fall through to the command-line credentials or a
//! prompt. A header row is recognised by its first cell and skipped.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use zeroize::Zeroizing;

use crate::core::device::Device;
use crate::core::scan::ScanTarget;
use crate::error::{Result, ScanError};

const HEADER_WORDS: &[&str] = &[
    "ip",
    "address",
    "host",
    "hostname",
    "device",
    "management_ip",
    "mgmt_ip",
];

fn is_header(first_cell: &str) -> bool {
    let cell = first_cell.trim().trim_start_matches('\u{feff}').to_lowercase();
    HEADER_WORDS.contains(&cell.as_str())
}

fn non_blank(cell: Option<&str>) -> Option<&str> {
    cell.map(str::trim).filter(|s| !s.is_empty())
}

/// Read targets from a CSV file.
///
/// # Errors
///
/// [`ScanError::InputFile`] if the file is missing, unreadable, malformed,
/// holds an unusable address, or lists no devices.
pub fn read_targets(path: &Path) -> Result<Vec<ScanTarget>> {
    let input_error = |message: String| ScanError::InputFile {
        path: path.display().to_string(),
        message,
    };
    let file = File::open(path).map_err(|e| input_error(e.to_string()))?;
    let targets = parse_targets(file).map_err(|e| match e {
        ScanError::InputFile { message, .. } => input_error(message),
        other => other,
    })?;
    if targets.is_empty() {
        return Err(input_error("no device rows found".to_string()));
    }
    tracing::info!(path = %path.display(), devices = targets.len(), "Loaded device list");
    Ok(targets)
}

/// Parse CSV rows from any reader. Returns an empty list for empty input.
///
/// # Errors
///
/// [`ScanError::InputFile`] (with an empty path) for malformed CSV or an
/// address that cannot be parsed.
pub fn parse_targets(reader: impl Read) -> Result<Vec<ScanTarget>> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut targets = Vec::new();
    for (index, record) in csv.records().enumerate() {
        let record = record.map_err(|e| ScanError::InputFile {
            path: String::new(),
            message: e.to_string(),
        })?;
        let line = record
            .position()
            .map_or(index + 1, |p| usize::try_from(p.line()).unwrap_or(index + 1));

        let Some(address) = non_blank(record.get(0)) else {
            continue;
        };
        if index == 0 && is_header(address) {
            tracing::debug!("Skipping header row");
            continue;
        }

        let device = Device::parse(address).map_err(|e| ScanError::InputFile {
            path: String::new(),
            message: format!("line {line}: {e}"),
        })?;
        targets.push(ScanTarget {
            device,
            username: non_blank(record.get(1)).map(str::to_string),
            password: non_blank(record.get(2)).map(|p| Zeroizing::new(p.to_string())),
            line: Some(line),
        });
    }
    Ok(targets)
}

/// Targets for addresses given on the command line.
///
/// # Errors
///
/// [`ScanError::Config`] for an address that cannot be parsed.
pub fn targets_from_hosts<S: AsRef<str>>(hosts: &[S]) -> Result<Vec<ScanTarget>> {
    hosts
        .iter()
        .map(|h| Device::parse(h.as_ref()).map(ScanTarget::bare))
        .collect()
}
