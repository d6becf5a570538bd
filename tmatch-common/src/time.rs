//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
///
/// Every lifecycle stamp goes through here so the monotonicity of
/// `requested_at <= accepted_at <= started_at <= completed_at` only depends
/// on one clock.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}
