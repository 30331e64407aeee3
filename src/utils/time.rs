//! Time utility functions

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Get current timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format timestamp as RFC3339
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339()
}

/// Milliseconds elapsed since `start`
pub fn elapsed_ms(start: Instant) -> u64 {
    duration_to_ms(start.elapsed())
}

/// Convert duration to milliseconds
pub fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
