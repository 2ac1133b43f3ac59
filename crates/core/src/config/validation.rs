//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::collections::HashSet;

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_version` is less than 1
    /// - `ttl_ms` is 0
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `base_url` is set but not an absolute URL
    /// - a preset key is empty or repeated
    /// - `preload_delay_ms` exceeds one minute
    /// - `preload_concurrency` is outside 1..=16
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_version < 1 {
            return Err(ConfigError::Invalid { field: "cache_version".into(), reason: "must be at least 1".into() });
        }

        if self.ttl_ms == 0 {
            return Err(ConfigError::Invalid { field: "ttl_ms".into(), reason: "must be greater than 0".into() });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if let Some(base) = &self.base_url
            && url::Url::parse(base).is_err()
        {
            return Err(ConfigError::Invalid { field: "base_url".into(), reason: format!("not an absolute URL: {base}") });
        }

        let mut seen = HashSet::new();
        for preset in &self.presets {
            if preset.key.trim().is_empty() {
                return Err(ConfigError::Invalid { field: "presets".into(), reason: "preset key must not be empty".into() });
            }
            if !seen.insert(preset.key.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "presets".into(),
                    reason: format!("duplicate preset key: {}", preset.key),
                });
            }
        }

        if self.preload_delay_ms > 60_000 {
            return Err(ConfigError::Invalid {
                field: "preload_delay_ms".into(),
                reason: "must not exceed one minute".into(),
            });
        }

        if !(1..=16).contains(&self.preload_concurrency) {
            return Err(ConfigError::Invalid {
                field: "preload_concurrency".into(),
                reason: "must be between 1 and 16".into(),
            });
        }

        if !self.cache_enabled {
            tracing::warn!("persistent cache disabled; images will be served from source");
        }

        Ok(())
    }
}
