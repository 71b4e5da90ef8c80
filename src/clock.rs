//! Wall-clock source in milliseconds since epoch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of "now".
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> f64;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        chrono::Utc::now().timestamp_millis() as f64
    }
}

/// A clock that only moves when told to; shared handles see the same time.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    /// Clock reading `start_ms`.
    #[must_use]
    pub fn new(start_ms: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start_ms.to_bits())),
        }
    }

    /// Jump to `ms`.
    pub fn set(&self, ms: f64) {
        self.bits.store(ms.to_bits(), Ordering::SeqCst);
    }

    /// Move forward by `ms`.
    pub fn advance(&self, ms: f64) {
        self.set(self.now_ms() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_shared() {
        let clock = ManualClock::new(1000.0);
        let handle = clock.clone();
        handle.advance(250.0);
        assert_eq!(clock.now_ms(), 1250.0);
        clock.set(5.0);
        assert_eq!(handle.now_ms(), 5.0);
    }

    #[test]
    fn system_clock_is_recent() {
        // after 2020-01-01
        assert!(SystemClock.now_ms() > 1_577_836_800_000.0);
    }
}
