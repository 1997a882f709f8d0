//! Minimum-interval rate limiting.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Admits at most one caller per `interval`.
///
/// Check and update happen under one lock, so two concurrent callers can
/// never both be admitted for the same window.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Claim the tick at `now` if the interval has elapsed since the last one.
    ///
    /// The first call is always admitted. A zero interval admits every call.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut last = self.last.lock();
        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Earliest instant at which the next call will be admitted.
    pub fn next_allowed(&self) -> Option<Instant> {
        self.last.lock().map(|prev| prev + self.interval)
    }
}
