//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (BACKDROP_*)
//! 2. TOML config file (if BACKDROP_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// One week, the default lifetime of a cached image.
pub const DEFAULT_TTL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// A built-in background offered by the selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    /// Logical cache key, e.g. `bg1`.
    pub key: String,
    /// Source locator, absolute or relative to `base_url`.
    pub url: String,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (BACKDROP_*)
/// 2. TOML config file (if BACKDROP_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via BACKDROP_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Whether persistent caching is enabled at all.
    ///
    /// When false every store operation reports `STORE_UNAVAILABLE` and
    /// images are served straight from their source.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Current cache version. Bump to invalidate every cached image.
    ///
    /// Set via BACKDROP_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: i64,

    /// Lifetime of a cached image in milliseconds.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per image.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Base URL that relative image locators are resolved against.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Built-in backgrounds warmed in the background after start-up.
    #[serde(default)]
    pub presets: Vec<Preset>,

    /// Delay before preset warming starts, so the selected background loads first.
    #[serde(default = "default_preload_delay_ms")]
    pub preload_delay_ms: u64,

    /// Maximum number of concurrent preset fetches.
    #[serde(default = "default_preload_concurrency")]
    pub preload_concurrency: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./backdrop-cache.sqlite")
}

fn default_cache_version() -> i64 {
    1
}

fn default_ttl_ms() -> u64 {
    DEFAULT_TTL_MS
}

fn default_user_agent() -> String {
    "backdrop/0.1".into()
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_preload_delay_ms() -> u64 {
    1_000
}

fn default_preload_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_enabled: true,
            cache_version: default_cache_version(),
            ttl_ms: default_ttl_ms(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            base_url: None,
            presets: Vec::new(),
            preload_delay_ms: default_preload_delay_ms(),
            preload_concurrency: default_preload_concurrency(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Cache entry lifetime.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Delay before preset warming.
    pub fn preload_delay(&self) -> Duration {
        Duration::from_millis(self.preload_delay_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `BACKDROP_`
    /// 2. TOML file from `BACKDROP_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("BACKDROP_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("BACKDROP_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Presets for warming, required when the caller supplied none.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no presets are configured.
    pub fn require_presets(&self) -> Result<&[Preset], ConfigError> {
        if self.presets.is_empty() {
            return Err(ConfigError::Missing {
                field: "presets".into(),
                hint: "Add [[presets]] entries to the file named by BACKDROP_CONFIG_FILE".into(),
            });
        }
        Ok(&self.presets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./backdrop-cache.sqlite"));
        assert!(config.cache_enabled);
        assert_eq!(config.cache_version, 1);
        assert_eq!(config.ttl_ms, 604_800_000);
        assert_eq!(config.user_agent, "backdrop/0.1");
        assert_eq!(config.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.timeout_ms, 20_000);
        assert!(config.base_url.is_none());
        assert!(config.presets.is_empty());
        assert_eq!(config.preload_delay_ms, 1_000);
        assert_eq!(config.preload_concurrency, 4);
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.ttl(), Duration::from_secs(7 * 24 * 60 * 60));
        assert_eq!(config.preload_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_require_presets_present() {
        let config = AppConfig {
            presets: vec![Preset { key: "bg1".into(), url: "/static/img/bg1.jpg".into() }],
            ..Default::default()
        };
        assert_eq!(config.require_presets().unwrap()[0].url, "/static/img/bg1.jpg");
    }

    #[test]
    fn test_require_presets_missing() {
        let config = AppConfig::default();
        assert!(matches!(config.require_presets(), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_load_from_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "backdrop.toml",
                r#"
                cache_version = 3
                base_url = "https://school.example/"

                [[presets]]
                key = "bg1"
                url = "static/img/bg1.jpg"
                "#,
            )?;
            jail.set_env("BACKDROP_CONFIG_FILE", "backdrop.toml");
            jail.set_env("BACKDROP_TIMEOUT_MS", "5000");

            let config = AppConfig::load().unwrap();
            assert_eq!(config.cache_version, 3);
            assert_eq!(config.timeout_ms, 5000);
            assert_eq!(config.base_url.as_deref(), Some("https://school.example/"));
            assert_eq!(config.presets.len(), 1);
            Ok(())
        });
    }
}
