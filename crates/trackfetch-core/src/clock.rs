//! Wall-clock helpers for persisted timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as Unix seconds (for job/download timestamps).
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
