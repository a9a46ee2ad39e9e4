//! Lock-ordering helper built on top of [`crate::kv::Kv`]'s fenced lease.
//!
//! Acquiring a single lock retries with jittered backoff up to a bounded
//! attempt count, surfacing `LockTimeout` on exhaustion. Acquiring several
//! at once always sorts them `match < session < stream` first, so any two
//! handlers that need the same set of entities can never deadlock against
//! each other.

use crate::error::{BanchoError, BanchoResult};
use crate::kv::{Kv, LeaseToken};
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockDomain {
    Match,
    Session,
    Stream,
}

fn lock_key(domain: LockDomain, name: &str) -> String {
    let prefix = match domain {
        LockDomain::Match => "match",
        LockDomain::Session => "session",
        LockDomain::Stream => "stream",
    };
    format!("{prefix}:{name}:lock")
}

#[derive(Debug)]
pub struct LockGuard {
    key: String,
    token: LeaseToken,
}

#[derive(Debug)]
pub struct MultiLockGuard {
    guards: Vec<LockGuard>,
}

pub async fn acquire(
    kv: &dyn Kv,
    domain: LockDomain,
    name: &str,
    ttl_ms: u64,
    max_retries: u32,
    base_backoff_ms: u64,
) -> BanchoResult<LockGuard> {
    let key = lock_key(domain, name);
    for attempt in 0..=max_retries {
        match kv.acquire_lease(&key, ttl_ms).await {
            Ok(token) => return Ok(LockGuard { key, token }),
            Err(_) if attempt < max_retries => {
                let jitter_ceiling = base_backoff_ms.max(1);
                let jitter = rand::thread_rng().gen_range(0..jitter_ceiling);
                let backoff = base_backoff_ms.saturating_mul(u64::from(attempt) + 1) + jitter;
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            Err(_) => {}
        }
    }
    Err(BanchoError::LockTimeout { name: key })
}

/// Acquire every `(domain, name)` pair, always in ascending `(domain, name)`
/// order regardless of the order given, releasing whatever was already
/// acquired if a later lock in the sequence times out.
pub async fn acquire_many(
    kv: &dyn Kv,
    mut entries: Vec<(LockDomain, String)>,
    ttl_ms: u64,
    max_retries: u32,
    base_backoff_ms: u64,
) -> BanchoResult<MultiLockGuard> {
    entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    let mut guards = Vec::with_capacity(entries.len());
    for (domain, name) in entries {
        match acquire(kv, domain, &name, ttl_ms, max_retries, base_backoff_ms).await {
            Ok(guard) => guards.push(guard),
            Err(err) => {
                for guard in guards {
                    kv.release_lease(&guard.key, guard.token).await;
                }
                return Err(err);
            }
        }
    }
    Ok(MultiLockGuard { guards })
}

pub async fn release(kv: &dyn Kv, guard: LockGuard) {
    kv.release_lease(&guard.key, guard.token).await;
}

pub async fn release_many(kv: &dyn Kv, guard: MultiLockGuard) {
    for guard in guard.guards {
        kv.release_lease(&guard.key, guard.token).await;
    }
}
