//! Time helpers
//!
//! Duration formatting and the monotonic millisecond clock used for session ids.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Round a duration to whole seconds (half a second rounds up)
pub fn round_seconds(duration: Duration) -> u64 {
    let millis = duration.as_millis() as u64;
    (millis + 500) / 1000
}

/// Format whole seconds as `HH:MM:SS`
///
/// Hours are not wrapped at 24.
pub fn format_hms(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Millisecond wall clock that never repeats a value
///
/// Each call returns `max(now_ms, last + 1)`.
#[derive(Debug, Default)]
pub struct MonotonicMillis {
    last: AtomicI64,
}

impl MonotonicMillis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp, strictly greater than every previous one
    pub fn next(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(current + 1);
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(59), "00:00:59");
        assert_eq!(format_hms(3661), "01:01:01");
        assert_eq!(format_hms(90_000), "25:00:00");
    }

    #[test]
    fn test_round_seconds() {
        assert_eq!(round_seconds(Duration::from_millis(0)), 0);
        assert_eq!(round_seconds(Duration::from_millis(499)), 0);
        assert_eq!(round_seconds(Duration::from_millis(500)), 1);
        assert_eq!(round_seconds(Duration::from_millis(61_400)), 61);
    }

    #[test]
    fn test_monotonic_millis_never_repeats() {
        let clock = MonotonicMillis::new();
        let mut previous = clock.next();
        for _ in 0..1000 {
            let next = clock.next();
            assert!(next > previous);
            previous = next;
        }
    }
}
