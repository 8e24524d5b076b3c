//! Time formatting utilities.

use std::time::Duration;

use chrono::{DateTime, TimeZone};

/// Timestamp embedded in artifact file names: `20240131_142501`.
#[must_use]
pub fn artifact_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Timestamp written to the `extraction_timestamp` column.
#[must_use]
pub fn record_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Short elapsed time for progress lines: `45s`, `3m 07s`, `1h 02m`.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn stamps_have_expected_shape() {
        let at = Utc.with_ymd_and_hms(2024, 1, 31, 14, 25, 1).unwrap();
        assert_eq!(artifact_stamp(&at), "20240131_142501");
        assert_eq!(record_stamp(&at), "2024-01-31 14:25:01");
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_secs(45)), "45s");
        assert_eq!(format_elapsed(Duration::from_secs(187)), "3m 07s");
        assert_eq!(format_elapsed(Duration::from_secs(3720)), "1h 02m");
    }
}
