//! Configuration validation, run once at startup after `AppConfig::load`.

use super::AppConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.bind_address does not parse as a socket address: {0}")]
    InvalidBindAddress(String),
    #[error("locks.{field} must be positive")]
    NonPositiveTtl { field: &'static str },
    #[error("workers.inactivity_check_interval_s ({check}) must be <= workers.inactivity_timeout_s ({timeout})")]
    ReaperIntervalTooLarge { check: u64, timeout: u64 },
    #[error("webhooks.urls[{channel}] is not a valid URL: {url}")]
    InvalidWebhookUrl { channel: String, url: String },
    #[error("protocol.version_floor ({floor}) must be <= protocol.version_ceiling ({ceiling})")]
    InvalidProtocolRange { floor: i32, ceiling: i32 },
}

pub fn validate(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.server.bind_address.clone(),
        ));
    }

    if config.locks.match_lock_ttl_ms == 0 {
        errors.push(ValidationError::NonPositiveTtl { field: "match_lock_ttl_ms" });
    }
    if config.locks.session_lock_ttl_ms == 0 {
        errors.push(ValidationError::NonPositiveTtl { field: "session_lock_ttl_ms" });
    }
    if config.locks.stream_lock_ttl_ms == 0 {
        errors.push(ValidationError::NonPositiveTtl { field: "stream_lock_ttl_ms" });
    }

    if config.workers.inactivity_check_interval_s > config.workers.inactivity_timeout_s {
        errors.push(ValidationError::ReaperIntervalTooLarge {
            check: config.workers.inactivity_check_interval_s,
            timeout: config.workers.inactivity_timeout_s,
        });
    }

    for (channel, url) in &config.webhooks.urls {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError::InvalidWebhookUrl {
                channel: channel.clone(),
                url: url.clone(),
            });
        }
    }

    if config.protocol.version_floor > config.protocol.version_ceiling {
        errors.push(ValidationError::InvalidProtocolRange {
            floor: config.protocol.version_floor,
            ceiling: config.protocol.version_ceiling,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
