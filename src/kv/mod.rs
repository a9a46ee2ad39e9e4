//! Abstract shared key/value store: named keys, hashes, sets, pub/sub, and
//! a fenced-lease mutex. A real deployment backs this with an external
//! store shared by every replica; [`memory::MemoryKv`] is the in-process
//! stand-in used by the single-process demo binary and by tests.

pub mod memory;

use async_trait::async_trait;
use std::collections::HashSet;

/// Opaque proof of lease ownership. `release_lease` only succeeds when the
/// caller presents the token it was handed by the matching `acquire_lease` —
/// a stale token from an expired lease is rejected even if nothing else has
/// since acquired the name ("fenced").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseToken(pub u64);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("lease {0} is already held")]
pub struct LeaseHeld(pub String);

#[async_trait]
pub trait Kv: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>);
    async fn del(&self, key: &str);

    async fn hget(&self, key: &str, field: &str) -> Option<Vec<u8>>;
    async fn hset(&self, key: &str, field: &str, value: Vec<u8>);
    async fn hdel(&self, key: &str, field: &str);
    async fn hgetall(&self, key: &str) -> Vec<(String, Vec<u8>)>;

    async fn sadd(&self, key: &str, member: String);
    async fn srem(&self, key: &str, member: &str);
    async fn smembers(&self, key: &str) -> HashSet<String>;

    async fn publish(&self, channel: &str, payload: Vec<u8>);
    fn subscribe(&self, channel: &str) -> tokio::sync::broadcast::Receiver<Vec<u8>>;

    /// Attempt to acquire the named lease for `ttl_ms`, non-blocking: a
    /// single attempt that either succeeds immediately or reports the lease
    /// is held. Retry/backoff policy lives in [`crate::locking`].
    async fn acquire_lease(&self, name: &str, ttl_ms: u64) -> Result<LeaseToken, LeaseHeld>;

    /// Release a lease previously returned by `acquire_lease`. A mismatched
    /// or already-expired token is silently ignored.
    async fn release_lease(&self, name: &str, token: LeaseToken);
}
