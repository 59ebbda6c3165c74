//! Time-related utilities with clock abstraction for testability.
//!
//! Every timestamp on the wire is an ISO-8601 string. Decoded timestamps are
//! normalised to the fixed server time zone (UTC+09:00).

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, SecondsFormat, Utc};

/// Offset of the server time zone from UTC, in seconds.
pub const SERVER_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Current time in the server time zone
    fn now(&self) -> DateTime<FixedOffset>;
}

/// System clock implementation (uses actual system time)
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        now_in_server_tz()
    }
}

/// Fixed clock implementation for testing (returns a fixed time)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: DateTime<FixedOffset>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    pub fn new(fixed_time: DateTime<FixedOffset>) -> Self {
        Self {
            fixed_time: fixed_time.with_timezone(&server_offset()),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.fixed_time
    }
}

/// The fixed server time zone offset
pub fn server_offset() -> FixedOffset {
    FixedOffset::east_opt(SERVER_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Current time in the server time zone
pub fn now_in_server_tz() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&server_offset())
}

/// Parse an ISO-8601 timestamp and convert it to the server time zone.
///
/// Timestamps without an offset are interpreted as UTC.
pub fn parse_to_server_tz(value: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Ok(dt.with_timezone(&server_offset())),
        Err(rfc3339_error) => {
            match NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
                Ok(naive) => Ok(naive.and_utc().with_timezone(&server_offset())),
                Err(_) => Err(rfc3339_error),
            }
        }
    }
}

/// Format a timestamp as ISO-8601 (RFC 3339, millisecond precision)
pub fn to_iso8601(value: &DateTime<FixedOffset>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, false)
}
