//! Time abstraction so every comparison in the service goes through one
//! seam tests can control deterministically.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch, used for all absolute timestamps
    /// (`silence_end_time`, `ping_time`, lease expiry).
    fn now(&self) -> i64;

    /// A monotonic clock in fractional seconds, used only for measuring
    /// durations (lock wait time, handler latency).
    fn monotonic(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn monotonic(&self) -> f64 {
        // std has no direct monotonic-as-f64 primitive without an anchor;
        // `Instant` values aren't comparable across processes anyway, so we
        // anchor to process start once.
        use std::time::Instant;
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = *START.get_or_init(Instant::now);
        start.elapsed().as_secs_f64()
    }
}

/// A clock tests can move forward explicitly, so timeouts and decay windows
/// are deterministic instead of racing real wall-clock time.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    now: Arc<AtomicI64>,
}

impl VirtualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn set(&self, value: i64) {
        self.now.store(value, Ordering::SeqCst);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn monotonic(&self) -> f64 {
        self.now.load(Ordering::SeqCst) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_advances() {
        let clock = VirtualClock::new(1000);
        assert_eq!(clock.now(), 1000);
        clock.advance(300);
        assert_eq!(clock.now(), 1300);
    }
}
