//! Named broadcast groups. Streams are KV-backed sets of `token_id`s so
//! every replica sees the same membership; `broadcast` is the only place
//! that actually touches a session's outbound queue.

use crate::locking::{self, LockDomain};
use crate::services::Services;
use crate::session::SessionManager;
use std::collections::HashSet;

pub const MAIN: &str = "main";
pub const LOBBY: &str = "lobby";

pub fn chat_stream(channel: &str) -> String {
    format!("chat/{channel}")
}

pub fn spectator_stream(host_user_id: i32) -> String {
    format!("spect/{host_user_id}")
}

pub fn multiplayer_stream(match_id: u16) -> String {
    format!("multiplay/{match_id}")
}

pub fn multiplayer_playing_stream(match_id: u16) -> String {
    format!("multiplay/{match_id}/playing")
}

fn members_key(name: &str) -> String {
    format!("stream:{name}:members")
}

fn registry_key() -> String {
    "streams:registry".to_string()
}

pub struct StreamRegistry;

impl StreamRegistry {
    pub async fn add(services: &Services, name: &str) {
        services.kv.sadd(&registry_key(), name.to_string()).await;
    }

    pub async fn remove(services: &Services, name: &str) {
        services.kv.srem(&registry_key(), name).await;
        services.kv.del(&members_key(name)).await;
    }

    pub async fn exists(services: &Services, name: &str) -> bool {
        services.kv.smembers(&registry_key()).await.contains(name)
    }

    pub async fn join(services: &Services, name: &str, token_id: &str) {
        let guard = locking::acquire(
            services.kv.as_ref(),
            LockDomain::Stream,
            name,
            services.lock_config.stream_lock_ttl_ms,
            services.lock_config.lock_acquire_retries,
            services.lock_config.lock_acquire_base_backoff_ms,
        )
        .await;
        services.kv.sadd(&members_key(name), token_id.to_string()).await;
        if let Ok(guard) = guard {
            locking::release(services.kv.as_ref(), guard).await;
        }
    }

    pub async fn leave(services: &Services, name: &str, token_id: &str) {
        let guard = locking::acquire(
            services.kv.as_ref(),
            LockDomain::Stream,
            name,
            services.lock_config.stream_lock_ttl_ms,
            services.lock_config.lock_acquire_retries,
            services.lock_config.lock_acquire_base_backoff_ms,
        )
        .await;
        services.kv.srem(&members_key(name), token_id).await;
        if let Ok(guard) = guard {
            locking::release(services.kv.as_ref(), guard).await;
        }
    }

    pub async fn members(services: &Services, name: &str) -> HashSet<String> {
        services.kv.smembers(&members_key(name)).await
    }

    pub async fn client_count(services: &Services, name: &str) -> usize {
        Self::members(services, name).await.len()
    }

    /// Appends `bytes` to every member session's outbound queue, skipping
    /// `except` (usually the sender) and any member whose privileges don't
    /// satisfy `require_privs`. Returns the number of sessions reached.
    pub async fn broadcast(
        services: &Services,
        sessions: &SessionManager,
        name: &str,
        bytes: &[u8],
        except: Option<&str>,
        require_privs: Option<u32>,
    ) -> usize {
        let members = Self::members(services, name).await;
        let mut reached = 0;
        for token_id in &members {
            if Some(token_id.as_str()) == except {
                continue;
            }
            let Some(session) = sessions.get(token_id).await else {
                continue;
            };
            if let Some(mask) = require_privs {
                let privs = session.read(|s| s.privileges).await;
                if privs & mask != mask {
                    continue;
                }
            }
            session.enqueue(bytes.to_vec()).await;
            reached += 1;
        }
        services.metrics.record_broadcast(name, reached);
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_requires_prior_add_only_for_existence_checks() {
        let services = Services::in_memory();
        assert!(!StreamRegistry::exists(&services, MAIN).await);
        StreamRegistry::add(&services, MAIN).await;
        assert!(StreamRegistry::exists(&services, MAIN).await);
        StreamRegistry::join(&services, MAIN, "tok-1").await;
        assert_eq!(StreamRegistry::client_count(&services, MAIN).await, 1);
        StreamRegistry::leave(&services, MAIN, "tok-1").await;
        assert_eq!(StreamRegistry::client_count(&services, MAIN).await, 0);
    }

    #[tokio::test]
    async fn remove_clears_membership() {
        let services = Services::in_memory();
        StreamRegistry::add(&services, LOBBY).await;
        StreamRegistry::join(&services, LOBBY, "tok-1").await;
        StreamRegistry::remove(&services, LOBBY).await;
        assert!(!StreamRegistry::exists(&services, LOBBY).await);
        assert_eq!(StreamRegistry::client_count(&services, LOBBY).await, 0);
    }
}
