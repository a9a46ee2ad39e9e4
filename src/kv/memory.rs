//! In-process [`Kv`] backend. Used by the single-process demo deployment
//! and by every test that needs KV semantics without a real external store.

use super::{Kv, LeaseHeld, LeaseToken};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio::time::Instant;

struct Lease {
    token: u64,
    expires_at: Instant,
}

pub struct MemoryKv {
    values: DashMap<String, Vec<u8>>,
    hashes: DashMap<String, DashMap<String, Vec<u8>>>,
    sets: DashMap<String, DashMap<String, ()>>,
    leases: DashMap<String, Lease>,
    lease_counter: AtomicU64,
    channels: DashMap<String, broadcast::Sender<Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
            hashes: DashMap::new(),
            sets: DashMap::new(),
            leases: DashMap::new(),
            lease_counter: AtomicU64::new(1),
            channels: DashMap::new(),
        }
    }

    fn channel(&self, name: &str) -> broadcast::Sender<Vec<u8>> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Kv for MemoryKv {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.values.get(key).map(|v| v.clone())
    }

    async fn set(&self, key: &str, value: Vec<u8>) {
        self.values.insert(key.to_string(), value);
    }

    async fn del(&self, key: &str) {
        self.values.remove(key);
    }

    async fn hget(&self, key: &str, field: &str) -> Option<Vec<u8>> {
        self.hashes.get(key).and_then(|h| h.get(field).map(|v| v.clone()))
    }

    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    async fn hdel(&self, key: &str, field: &str) {
        if let Some(h) = self.hashes.get(key) {
            h.remove(field);
        }
    }

    async fn hgetall(&self, key: &str) -> Vec<(String, Vec<u8>)> {
        match self.hashes.get(key) {
            Some(h) => h.iter().map(|e| (e.key().clone(), e.value().clone())).collect(),
            None => Vec::new(),
        }
    }

    async fn sadd(&self, key: &str, member: String) {
        self.sets.entry(key.to_string()).or_default().insert(member, ());
    }

    async fn srem(&self, key: &str, member: &str) {
        if let Some(s) = self.sets.get(key) {
            s.remove(member);
        }
    }

    async fn smembers(&self, key: &str) -> HashSet<String> {
        match self.sets.get(key) {
            Some(s) => s.iter().map(|e| e.key().clone()).collect(),
            None => HashSet::new(),
        }
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) {
        // No subscribers is not an error; broadcast::Sender::send fails only
        // when the receiver count is zero.
        let _ = self.channel(channel).send(payload);
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<Vec<u8>> {
        self.channel(channel).subscribe()
    }

    async fn acquire_lease(&self, name: &str, ttl_ms: u64) -> Result<LeaseToken, LeaseHeld> {
        use dashmap::mapref::entry::Entry;
        let now = Instant::now();
        let token = self.lease_counter.fetch_add(1, Ordering::SeqCst);
        let lease = Lease {
            token,
            expires_at: now + tokio::time::Duration::from_millis(ttl_ms),
        };
        match self.leases.entry(name.to_string()) {
            Entry::Occupied(mut occ) => {
                if occ.get().expires_at > now {
                    return Err(LeaseHeld(name.to_string()));
                }
                occ.insert(lease);
            }
            Entry::Vacant(vac) => {
                vac.insert(lease);
            }
        }
        Ok(LeaseToken(token))
    }

    async fn release_lease(&self, name: &str, token: LeaseToken) {
        self.leases.remove_if(name, |_, lease| lease.token == token.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_set_del_round_trip() {
        let kv = MemoryKv::new();
        kv.set("k", b"v".to_vec()).await;
        assert_eq!(kv.get("k").await, Some(b"v".to_vec()));
        kv.del("k").await;
        assert_eq!(kv.get("k").await, None);
    }

    #[tokio::test]
    async fn hash_ops() {
        let kv = MemoryKv::new();
        kv.hset("h", "f1", b"a".to_vec()).await;
        kv.hset("h", "f2", b"b".to_vec()).await;
        assert_eq!(kv.hget("h", "f1").await, Some(b"a".to_vec()));
        let mut all = kv.hgetall("h").await;
        all.sort();
        assert_eq!(all, vec![("f1".to_string(), b"a".to_vec()), ("f2".to_string(), b"b".to_vec())]);
        kv.hdel("h", "f1").await;
        assert_eq!(kv.hget("h", "f1").await, None);
    }

    #[tokio::test]
    async fn set_ops() {
        let kv = MemoryKv::new();
        kv.sadd("s", "a".into()).await;
        kv.sadd("s", "b".into()).await;
        assert_eq!(kv.smembers("s").await.len(), 2);
        kv.srem("s", "a").await;
        assert_eq!(kv.smembers("s").await, HashSet::from(["b".to_string()]));
    }

    #[tokio::test]
    async fn lease_is_exclusive_until_released() {
        let kv = MemoryKv::new();
        let token = kv.acquire_lease("match:1:lock", 10_000).await.unwrap();
        assert!(kv.acquire_lease("match:1:lock", 10_000).await.is_err());
        kv.release_lease("match:1:lock", token).await;
        assert!(kv.acquire_lease("match:1:lock", 10_000).await.is_ok());
    }

    #[tokio::test]
    async fn stale_token_cannot_release_a_newer_lease() {
        let kv = MemoryKv::new();
        let stale = kv.acquire_lease("x", 0).await.unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
        let fresh = kv.acquire_lease("x", 10_000).await.unwrap();
        kv.release_lease("x", stale).await;
        // the fresh lease must still be held since the stale token didn't match
        assert!(kv.acquire_lease("x", 10_000).await.is_err());
        kv.release_lease("x", fresh).await;
        assert!(kv.acquire_lease("x", 10_000).await.is_ok());
    }

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let kv = MemoryKv::new();
        let mut rx = kv.subscribe("peppy:ban");
        kv.publish("peppy:ban", b"7".to_vec()).await;
        assert_eq!(rx.recv().await.unwrap(), b"7".to_vec());
    }
}
