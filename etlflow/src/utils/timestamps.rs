//! Timestamp parsing for dataset cells.

use crate::core::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// Represents a UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Errors that can occur during timestamp parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    /// The cell is null.
    #[error("Missing timestamp")]
    Missing,

    /// The timestamp string is empty.
    #[error("Empty timestamp string")]
    EmptyString,

    /// The timestamp value is invalid.
    #[error("Invalid timestamp: {0}")]
    InvalidFormat(String),

    /// Nanosecond precision is not supported.
    #[error("Nanosecond precision timestamps are not supported")]
    NanosecondPrecision,
}

/// Detected precision of a Unix timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnixPrecision {
    Seconds,
    Milliseconds,
    Microseconds,
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Returns the current UTC time as an ISO 8601 formatted string.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Parses a date or date-time string.
///
/// Accepts RFC 3339, `YYYY-MM-DD[T| ]HH:MM:SS[.f]` and `YYYY-MM-DD`.
/// Values without an offset are taken as UTC.
pub fn parse_timestamp(input: &str) -> Result<Timestamp, TimestampError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(TimestampError::EmptyString);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(TimestampError::InvalidFormat(trimmed.to_string()))
}

/// Interprets a dataset cell as a timestamp.
///
/// Text is parsed with [`parse_timestamp`]; integers are Unix epochs whose
/// precision (seconds, milliseconds, microseconds) is detected from the digit count.
pub fn value_to_timestamp(value: &Value) -> Result<Timestamp, TimestampError> {
    match value {
        Value::Null => Err(TimestampError::Missing),
        Value::Text(s) => parse_timestamp(s),
        Value::Int(v) => parse_unix_timestamp(*v),
        Value::Float(v) => Err(TimestampError::InvalidFormat(v.to_string())),
    }
}

fn detect_unix_precision(timestamp: i64) -> Result<UnixPrecision, TimestampError> {
    match timestamp.unsigned_abs().max(1).to_string().len() {
        0..=10 => Ok(UnixPrecision::Seconds),
        11..=13 => Ok(UnixPrecision::Milliseconds),
        14..=16 => Ok(UnixPrecision::Microseconds),
        _ => Err(TimestampError::NanosecondPrecision),
    }
}

fn parse_unix_timestamp(value: i64) -> Result<Timestamp, TimestampError> {
    let parsed = match detect_unix_precision(value)? {
        UnixPrecision::Seconds => Utc.timestamp_opt(value, 0).single(),
        UnixPrecision::Milliseconds => Utc.timestamp_millis_opt(value).single(),
        UnixPrecision::Microseconds => Utc.timestamp_micros(value).single(),
    };
    parsed.ok_or_else(|| TimestampError::InvalidFormat(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_timestamp("2023-10-05T14:30:00+02:00").unwrap();
        assert_eq!(dt.hour(), 12);
    }

    #[test]
    fn test_parse_naive_datetime_as_utc() {
        let dt = parse_timestamp("2023-10-05 14:30:00").unwrap();
        assert_eq!(dt.year(), 2023);
        assert_eq!(dt.hour(), 14);
    }

    #[test]
    fn test_parse_date_only() {
        let dt = parse_timestamp("2023-01-31").unwrap();
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 31);
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_timestamp(""), Err(TimestampError::EmptyString));
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(TimestampError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_value_to_timestamp_epochs() {
        let secs = value_to_timestamp(&Value::Int(1_696_512_000)).unwrap();
        let millis = value_to_timestamp(&Value::Int(1_696_512_000_000)).unwrap();
        assert_eq!(secs, millis);
        assert_eq!(value_to_timestamp(&Value::Null), Err(TimestampError::Missing));
    }

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }
}
