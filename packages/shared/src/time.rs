//! Time-related utilities with clock abstraction for testability.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Get current Unix timestamp in milliseconds
    fn now_millis(&self) -> i64;
}

/// System clock implementation (uses actual system time)
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Fixed clock implementation for testing (returns a fixed time)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: i64,
}

impl FixedClock {
    /// Create a new fixed clock with the given timestamp
    pub fn new(fixed_time_millis: i64) -> Self {
        Self {
            fixed_time: fixed_time_millis,
        }
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.fixed_time
    }
}

/// Format a Unix timestamp (milliseconds, UTC) as a JST wall-clock time
/// for chat display, e.g. `21:03:45`.
pub fn timestamp_to_jst_clock(timestamp_millis: i64) -> String {
    let jst_offset = FixedOffset::east_opt(9 * 3600).unwrap(); // JST is UTC+9
    let seconds = timestamp_millis.div_euclid(1000);
    match jst_offset.timestamp_opt(seconds, 0).single() {
        Some(dt) => dt.format("%H:%M:%S").to_string(),
        None => "--:--:--".to_string(),
    }
}

/// Format a media duration in milliseconds as `m:ss` or `h:mm:ss`.
///
/// Negative durations (a position the server has not started counting yet)
/// render as `0:00`.
pub fn duration_string(millis: i64) -> String {
    let total_seconds = (millis.max(0)) / 1000;
    let seconds = total_seconds % 60;
    let minutes = (total_seconds / 60) % 60;
    let hours = total_seconds / 3600;
    if hours == 0 {
        format!("{}:{:02}", minutes, seconds)
    } else {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Convert a chat timestamp in Unix milliseconds to a [`DateTime<Utc>`].
///
/// Out-of-range values collapse to the Unix epoch instead of failing, since
/// a bad timestamp from the wire should never take the client down.
pub fn datetime_from_millis(timestamp_millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_millis).unwrap_or_default()
}
