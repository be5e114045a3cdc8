//! Wall-clock and uptime helpers

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

static STARTED: OnceLock<Instant> = OnceLock::new();

/// Milliseconds since the Unix epoch; 0 if the clock is before it
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Record process start for `/health`. Later calls keep the first instant.
pub fn mark_started() {
    STARTED.get_or_init(Instant::now);
}

pub fn uptime_secs() -> u64 {
    STARTED.get().map_or(0, |t| t.elapsed().as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn first_mark_wins() {
        mark_started();
        let first = *STARTED.get().unwrap();
        mark_started();
        assert_eq!(*STARTED.get().unwrap(), first);
        assert!(uptime_secs() < 60);
    }
}
