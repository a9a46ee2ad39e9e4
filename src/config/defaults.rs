//! `serde(default = ...)` helper functions for [`super::types::AppConfig`].

pub fn default_bind_address() -> String {
    "0.0.0.0:13381".to_string()
}

pub fn default_kv_backend() -> String {
    "memory".to_string()
}

pub fn default_match_lock_ttl_ms() -> u64 {
    5_000
}

pub fn default_session_lock_ttl_ms() -> u64 {
    5_000
}

pub fn default_stream_lock_ttl_ms() -> u64 {
    5_000
}

pub fn default_lock_acquire_retries() -> u32 {
    5
}

pub fn default_lock_acquire_base_backoff_ms() -> u64 {
    20
}

pub fn default_inactivity_check_interval_s() -> u64 {
    300
}

pub fn default_inactivity_timeout_s() -> u64 {
    300
}

pub fn default_spam_decay_interval_s() -> u64 {
    10
}

pub fn default_protocol_version_floor() -> i32 {
    5
}

pub fn default_protocol_version_ceiling() -> i32 {
    19
}
