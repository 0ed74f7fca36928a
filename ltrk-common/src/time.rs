//! Timestamp utilities
//!
//! All persisted timestamps use RFC 3339 UTC with millisecond precision so
//! that lexicographic comparison in SQL matches chronological order.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage (RFC 3339, UTC, millisecond precision)
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current timestamp in storage format
pub fn timestamp_now() -> String {
    format_timestamp(now())
}

/// Wall-clock hour window key (`YYYY-MM-DD-HH`, UTC)
///
/// Rate-limit counters are keyed by this value; counts never carry over
/// between hours.
pub fn hour_window_key(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d-%H").to_string()
}

/// Start of the next wall-clock hour after `t`
pub fn next_hour_boundary(t: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = t
        .with_minute(0)
        .and_then(|v| v.with_second(0))
        .and_then(|v| v.with_nanosecond(0))
        .unwrap_or(t);
    truncated + chrono::Duration::hours(1)
}
