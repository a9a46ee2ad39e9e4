//! Dependency-injection root. Every component takes a `Services` handle
//! instead of reaching for a process-wide global, so tests can assemble an
//! in-memory variant end to end.

use crate::clock::{Clock, SystemClock, VirtualClock};
use crate::kv::memory::MemoryKv;
use crate::kv::Kv;
use crate::metrics::{MetricsSink, NoopMetricsSink};
use crate::user_store::{InMemoryUserStore, UserStore};
use crate::webhook::{NoopWebhook, Webhook};
use std::sync::Arc;

#[derive(Clone)]
pub struct Services {
    pub kv: Arc<dyn Kv>,
    pub clock: Arc<dyn Clock>,
    pub user_store: Arc<dyn UserStore>,
    pub metrics: Arc<dyn MetricsSink>,
    pub webhook: Arc<dyn Webhook>,
    pub lock_config: crate::config::LockConfig,
}

impl Services {
    pub fn new(
        kv: Arc<dyn Kv>,
        clock: Arc<dyn Clock>,
        user_store: Arc<dyn UserStore>,
        metrics: Arc<dyn MetricsSink>,
        webhook: Arc<dyn Webhook>,
        lock_config: crate::config::LockConfig,
    ) -> Self {
        Self { kv, clock, user_store, metrics, webhook, lock_config }
    }

    /// An in-process assembly with a real wall clock, suitable for the
    /// single-process demo binary.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryKv::new()),
            Arc::new(SystemClock),
            Arc::new(InMemoryUserStore::new()),
            Arc::new(NoopMetricsSink),
            Arc::new(NoopWebhook),
            crate::config::LockConfig::default(),
        )
    }

    /// An in-process assembly with a [`VirtualClock`] callers can move
    /// forward explicitly, for deterministic tests of time-based behavior.
    pub fn in_memory_with_virtual_clock(start: i64) -> (Self, VirtualClock) {
        let clock = VirtualClock::new(start);
        let services = Self::new(
            Arc::new(MemoryKv::new()),
            Arc::new(clock.clone()),
            Arc::new(InMemoryUserStore::new()),
            Arc::new(NoopMetricsSink),
            Arc::new(NoopWebhook),
            crate::config::LockConfig::default(),
        );
        (services, clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_assembly_is_constructible() {
        let services = Services::in_memory();
        assert_eq!(services.clock.now() > 0, true);
    }

    #[test]
    fn virtual_clock_assembly_shares_the_same_clock() {
        let (services, clock) = Services::in_memory_with_virtual_clock(1_000);
        clock.advance(50);
        assert_eq!(services.clock.now(), 1_050);
    }
}
