//! Subcommand implementations.
//!
//! Each `*_impl` function takes the shared [`App`] and returns a
//! serializable output struct; `main` renders it.

pub mod backgrounds;
pub mod cache;
pub mod error;
pub mod status;

use std::sync::Arc;

use backdrop_client::{BackgroundSelector, FetchClient, FetchConfig, ImageCache, ImageSource};
use backdrop_core::{AppConfig, Error, ImageStore};
use serde::Serialize;

/// Everything a command needs: configuration and the wired-up selector.
pub struct App {
    pub config: AppConfig,
    selector: BackgroundSelector,
}

impl App {
    /// Wire the store and HTTP client from configuration.
    pub fn new(config: AppConfig) -> Result<Self, Error> {
        let store = Arc::new(ImageStore::from_config(&config));
        let client = FetchClient::new(FetchConfig::from_app_config(&config)?)?;
        Ok(Self::with_parts(config, store, Arc::new(client)))
    }

    pub fn with_parts(config: AppConfig, store: Arc<ImageStore>, source: Arc<dyn ImageSource>) -> Self {
        let cache = ImageCache::new(store, source).with_preload_concurrency(config.preload_concurrency);
        let selector = BackgroundSelector::from_config(cache, &config);
        Self { config, selector }
    }

    pub fn cache(&self) -> &ImageCache {
        self.selector.cache()
    }

    pub fn selector(&self) -> &BackgroundSelector {
        &self.selector
    }
}

/// Render command output as pretty JSON.
pub fn render<T: Serialize>(output: &T) -> Result<String, Error> {
    serde_json::to_string_pretty(output).map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))
}
