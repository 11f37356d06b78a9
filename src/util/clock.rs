//! Wall-clock helpers shared by the queue, dispatcher, and monitor.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since the Unix epoch.
///
/// Panics only if the system clock is set before 1970, which every other
/// timestamp in this crate already assumes cannot happen.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis()
}
