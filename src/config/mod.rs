//! Configuration loading and validation.
//!
//! [`types`] holds the struct definitions, [`defaults`] holds the
//! `serde(default = ...)` functions, [`validation`] holds the post-load
//! sanity pass.

mod defaults;
mod types;
mod validation;

pub use types::{AppConfig, KvConfig, LockConfig, ProtocolConfig, ServerConfig, WebhookConfig, WorkerConfig};
pub use validation::{validate, ValidationError};

use crate::error::ConfigError;
use std::path::Path;

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: AppConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// `APP_PORT` and `APP_COMPONENT` take precedence over whatever the TOML
    /// file says, matching the env/CLI contract in the external interfaces.
    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("APP_PORT") {
            if let Some(host) = self.server.bind_address.rsplit_once(':').map(|(h, _)| h) {
                self.server.bind_address = format!("{host}:{port}");
            }
        }
        if let Ok(component) = std::env::var("APP_COMPONENT") {
            self.server.component_name = component;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self).map_err(|errs| {
            ConfigError::Invalid(errs.into_iter().map(|e| e.to_string()).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_applies_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banchod.toml");
        std::fs::write(&path, "[server]\nbind_address = \"0.0.0.0:1000\"\n").unwrap();

        // SAFETY-irrelevant: std::env::set_var is unsafe only w.r.t. being
        // process-global; this test doesn't run concurrently with others
        // that read APP_PORT.
        unsafe {
            std::env::set_var("APP_PORT", "9999");
        }
        let config = AppConfig::load(&path).unwrap();
        unsafe {
            std::env::remove_var("APP_PORT");
        }
        assert_eq!(config.server.bind_address, "0.0.0.0:9999");
    }

    #[test]
    fn default_config_validates() {
        assert!(AppConfig::default().validate().is_ok());
    }
}
