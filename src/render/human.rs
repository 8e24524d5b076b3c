//! Human-readable run summary.
//!
//! One line per device, a fix hint under each failure, then totals.

use std::fmt::Write as _;

use colored::{Color, Colorize};

use crate::core::capture::CaptureStatus;
use crate::core::scan::ScanResult;
use crate::render::RunSummary;
use crate::util::format_elapsed;

fn paint(text: &str, color: Color, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        text.color(color).to_string()
    }
}

fn bold(text: &str, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        text.bold().to_string()
    }
}

fn status_color(status: CaptureStatus) -> Color {
    match status {
        CaptureStatus::Success => Color::Green,
        CaptureStatus::TimedOut => Color::Yellow,
        CaptureStatus::Failed => Color::Red,
        CaptureStatus::NotRequested => Color::BrightBlack,
    }
}

/// One line for a finished device, as printed while the scan runs.
#[must_use]
pub fn render_device_line(result: &ScanResult, no_color: bool) -> String {
    let mut line = String::new();
    if result.is_failure() {
        let _ = write!(
            line,
            "{} {}",
            paint("✗", Color::Red, no_color),
            bold(&result.management_ip, no_color)
        );
    } else {
        let _ = write!(
            line,
            "{} {}  {}  {}",
            paint("✓", Color::Green, no_color),
            bold(&result.management_ip, no_color),
            result.field("hostname"),
            result.field("active_version"),
        );
    }

    for (label, status) in [
        ("QKView", result.diagnostic_status),
        ("UCS", result.backup_status),
    ] {
        if status != CaptureStatus::NotRequested {
            let _ = write!(
                line,
                "  {label}: {}",
                paint(status.as_str(), status_color(status), no_color)
            );
        }
    }

    if let Some(error) = &result.error {
        let code = result.error_code.unwrap_or("BIGSCAN-X099");
        let _ = write!(
            line,
            "\n    {} {}",
            paint(error, Color::Red, no_color),
            paint(&format!("[{code}]"), Color::BrightBlack, no_color)
        );
        if let Some(hint) = &result.hint {
            let _ = write!(
                line,
                "\n    Fix: {}",
                paint(hint, Color::Cyan, no_color)
            );
        }
    }
    for warning in &result.warnings {
        let _ = write!(line, "\n    {} {warning}", paint("!", Color::Yellow, no_color));
    }
    line
}

/// Full summary: device lines followed by totals.
#[must_use]
pub fn render_summary(summary: &RunSummary, results: &[ScanResult], no_color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", bold("BIG-IP scan results", no_color));
    for result in results {
        let _ = writeln!(out, "  {}", render_device_line(result, no_color).replace('\n', "\n  "));
    }
    out.push('\n');

    let failed = if summary.failed > 0 {
        paint(&format!("{} failed", summary.failed), Color::Red, no_color)
    } else {
        format!("{} failed", summary.failed)
    };
    let _ = writeln!(
        out,
        "Devices: {}  ({} succeeded, {failed}) in {}",
        summary.devices,
        summary.succeeded,
        format_elapsed(std::time::Duration::from_secs(summary.elapsed_secs)),
    );
    if let Some(count) = summary.qkviews_downloaded {
        let _ = writeln!(out, "QKViews downloaded: {count}/{}", summary.devices);
    }
    if let Some(count) = summary.ucs_downloaded {
        let _ = writeln!(out, "UCS backups downloaded: {count}/{}", summary.devices);
    }
    let _ = writeln!(out, "Results written to: {}", summary.output.display());
    out
}
