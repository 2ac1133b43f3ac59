//! Background selection on top of [`ImageCache`].
//!
//! Tracks which background is active, re-applies it at start-up, warms the
//! built-in presets, and turns uploaded files into cached data URLs.

use std::time::Duration;

use backdrop_core::cache::key::upload_key;
use backdrop_core::cache::settings::NO_BACKGROUND;
use backdrop_core::{AppConfig, Error, Preset, Selection};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::data_url::{detect_media_type, encode_data_url};
use crate::image_cache::{ImageCache, PreloadSummary, Resolved};

/// Result of [`BackgroundSelector::init`].
#[derive(Debug)]
pub struct Startup {
    /// The saved selection and how it resolved, if one was saved.
    pub restored: Option<(Selection, Resolved)>,
    /// Delayed preset warm running in the background.
    pub preload: JoinHandle<PreloadSummary>,
}

/// Outcome of [`BackgroundSelector::clear_cache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheCleared {
    pub removed: u64,
    /// Status line for the user.
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct BackgroundSelector {
    cache: ImageCache,
    presets: Vec<Preset>,
    preload_delay: Duration,
}

impl BackgroundSelector {
    pub fn new(cache: ImageCache, presets: Vec<Preset>, preload_delay: Duration) -> Self {
        Self { cache, presets, preload_delay }
    }

    pub fn from_config(cache: ImageCache, config: &AppConfig) -> Self {
        Self::new(cache, config.presets.clone(), config.preload_delay())
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    /// Look up a built-in background by key.
    pub fn preset(&self, key: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.key == key)
    }

    /// Resolve a background through the cache.
    pub async fn apply(&self, url: &str, key: &str) -> Resolved {
        self.cache.fetch_and_cache(url, key).await
    }

    /// Make `key` the active background.
    ///
    /// `none` clears the saved selection and returns `None`. Any other key is
    /// applied and saved, even if it could only be passed through.
    pub async fn select(&self, key: &str, url: &str) -> Option<Resolved> {
        if key == NO_BACKGROUND {
            self.cache.store().clear_selection().await;
            tracing::info!("background cleared");
            return None;
        }

        let resolved = self.apply(url, key).await;
        let selection = Selection { key: key.to_string(), url: url.to_string() };
        self.cache.store().save_selection(&selection).await;
        tracing::info!(key, source = resolved.source(), "background selected");
        Some(resolved)
    }

    /// Re-apply the saved background, if any.
    pub async fn restore(&self) -> Option<(Selection, Resolved)> {
        let selection = self.cache.store().selection().await?;
        let resolved = self.apply(&selection.url, &selection.key).await;
        tracing::info!(key = %selection.key, source = resolved.source(), "background restored");
        Some((selection, resolved))
    }

    /// Cache an uploaded image and select it.
    ///
    /// The key is derived from the content, so the same file always lands
    /// on the same entry. Nothing is fetched.
    pub async fn upload(&self, bytes: &[u8], file_name: &str) -> Result<Selection, Error> {
        if bytes.is_empty() {
            return Err(Error::InvalidInput(format!("{file_name}: empty file")));
        }

        let media_type = detect_media_type(bytes, file_name);
        if !media_type.starts_with("image/") {
            return Err(Error::InvalidInput(format!("{file_name}: not an image ({media_type})")));
        }

        let selection = Selection { key: upload_key(bytes), url: encode_data_url(&media_type, bytes) };
        self.select(&selection.key, &selection.url).await;
        Ok(selection)
    }

    /// Warm every configured preset.
    pub async fn preload_presets(&self) -> PreloadSummary {
        self.cache.preload(&self.presets).await
    }

    /// Restore the saved background, then warm presets after the configured
    /// delay on a separate task.
    pub async fn init(&self) -> Startup {
        let restored = self.restore().await;

        let selector = self.clone();
        let preload = tokio::spawn(async move {
            tokio::time::sleep(selector.preload_delay).await;
            selector.preload_presets().await
        });

        Startup { restored, preload }
    }

    /// Drop every cached image, with a status line for the user.
    pub async fn clear_cache(&self) -> Result<CacheCleared, Error> {
        let removed = self.cache.try_clear_all().await?;
        let message = format!("Cleared {removed} cached background(s); they will be fetched again on next use");
        Ok(CacheCleared { removed, message })
    }
}
