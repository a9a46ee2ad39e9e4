//! Configuration type definitions.

use serde::Deserialize;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub kv: KvConfig,
    #[serde(default)]
    pub locks: LockConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            kv: KvConfig::default(),
            locks: LockConfig::default(),
            workers: WorkerConfig::default(),
            protocol: ProtocolConfig::default(),
            webhooks: WebhookConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// `APP_COMPONENT` override; identifies this replica in logs/metrics.
    #[serde(default)]
    pub component_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            component_name: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KvConfig {
    /// `"memory"` for the in-process backend used by tests and the demo
    /// deployment, or a connection string for a real shared store.
    #[serde(default = "default_kv_backend")]
    pub backend: String,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            backend: default_kv_backend(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_match_lock_ttl_ms")]
    pub match_lock_ttl_ms: u64,
    #[serde(default = "default_session_lock_ttl_ms")]
    pub session_lock_ttl_ms: u64,
    #[serde(default = "default_stream_lock_ttl_ms")]
    pub stream_lock_ttl_ms: u64,
    #[serde(default = "default_lock_acquire_retries")]
    pub lock_acquire_retries: u32,
    #[serde(default = "default_lock_acquire_base_backoff_ms")]
    pub lock_acquire_base_backoff_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            match_lock_ttl_ms: default_match_lock_ttl_ms(),
            session_lock_ttl_ms: default_session_lock_ttl_ms(),
            stream_lock_ttl_ms: default_stream_lock_ttl_ms(),
            lock_acquire_retries: default_lock_acquire_retries(),
            lock_acquire_base_backoff_ms: default_lock_acquire_base_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_inactivity_check_interval_s")]
    pub inactivity_check_interval_s: u64,
    #[serde(default = "default_inactivity_timeout_s")]
    pub inactivity_timeout_s: u64,
    #[serde(default = "default_spam_decay_interval_s")]
    pub spam_decay_interval_s: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            inactivity_check_interval_s: default_inactivity_check_interval_s(),
            inactivity_timeout_s: default_inactivity_timeout_s(),
            spam_decay_interval_s: default_spam_decay_interval_s(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_protocol_version_floor")]
    pub version_floor: i32,
    #[serde(default = "default_protocol_version_ceiling")]
    pub version_ceiling: i32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            version_floor: default_protocol_version_floor(),
            version_ceiling: default_protocol_version_ceiling(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    /// Moderation-channel name → webhook URL. Empty means moderation events
    /// are logged but not shipped anywhere.
    #[serde(default)]
    pub urls: std::collections::HashMap<String, String>,
}
