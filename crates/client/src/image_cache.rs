//! Background image cache.
//!
//! [`ImageCache`] turns a `(locator, key)` pair into something a page can
//! use directly: a data URL served from the store, a freshly fetched data
//! URL, or, when everything fails, the original locator untouched.

use std::sync::Arc;

use backdrop_core::{CacheDb, Error, ImageStore, Preset};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::data_url::{encode_data_url, is_data_url, media_type_for};
use crate::fetch::ImageSource;

/// Outcome of [`ImageCache::fetch_and_cache`].
///
/// Callers normally only need [`Resolved::locator`]; the variant says where
/// it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Valid entry found in the store; no network access happened.
    Cached(String),
    /// Materialized from the source. `stored` is false when the write failed
    /// and the next call will fetch again.
    Fetched { data_url: String, stored: bool },
    /// Source could not be materialized; this is the original locator.
    PassThrough(String),
}

impl Resolved {
    /// The string to use as the image locator.
    pub fn locator(&self) -> &str {
        match self {
            Resolved::Cached(data) | Resolved::PassThrough(data) => data,
            Resolved::Fetched { data_url, .. } => data_url,
        }
    }

    pub fn into_locator(self) -> String {
        match self {
            Resolved::Cached(data) | Resolved::PassThrough(data) => data,
            Resolved::Fetched { data_url, .. } => data_url,
        }
    }

    /// Whether the locator is a self-contained data URL.
    pub fn is_materialized(&self) -> bool {
        !matches!(self, Resolved::PassThrough(_))
    }

    /// Short label for logs and CLI output.
    pub fn source(&self) -> &'static str {
        match self {
            Resolved::Cached(_) => "cache",
            Resolved::Fetched { .. } => "fetched",
            Resolved::PassThrough(_) => "passthrough",
        }
    }
}

/// Counts from a batch warm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreloadSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Image cache combining the persistent store with an image source.
#[derive(Clone)]
pub struct ImageCache {
    store: Arc<ImageStore>,
    source: Arc<dyn ImageSource>,
    preload_concurrency: usize,
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("store", &self.store)
            .field("preload_concurrency", &self.preload_concurrency)
            .finish_non_exhaustive()
    }
}

impl ImageCache {
    pub fn new(store: Arc<ImageStore>, source: Arc<dyn ImageSource>) -> Self {
        Self { store, source, preload_concurrency: 4 }
    }

    /// Limit concurrent fetches during [`ImageCache::preload`].
    pub fn with_preload_concurrency(mut self, limit: usize) -> Self {
        self.preload_concurrency = limit.max(1);
        self
    }

    pub fn store(&self) -> &Arc<ImageStore> {
        &self.store
    }

    pub async fn connect(&self) -> Result<CacheDb, Error> {
        self.store.connect().await
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.store.get(key).await
    }

    pub async fn put(&self, key: &str, payload: &str) -> bool {
        self.store.put(key, payload).await
    }

    pub async fn evict(&self, key: &str) -> bool {
        self.store.evict(key).await
    }

    pub async fn clear_all(&self) -> bool {
        self.store.clear_all().await
    }

    pub async fn try_clear_all(&self) -> Result<u64, Error> {
        self.store.try_clear_all().await
    }

    /// Return a usable locator for `source_url`, caching it under `key`.
    ///
    /// 1. A valid stored entry is returned without touching the network.
    /// 2. A data URL source is stored as-is.
    /// 3. Otherwise the source is fetched, encoded, and stored; a failed
    ///    store write still returns the payload.
    /// 4. If the fetch fails, `source_url` comes back unchanged.
    pub async fn fetch_and_cache(&self, source_url: &str, key: &str) -> Resolved {
        if let Some(data) = self.store.get(key).await {
            return Resolved::Cached(data);
        }

        let data_url = if is_data_url(source_url) {
            source_url.to_string()
        } else {
            match self.materialize(source_url).await {
                Ok(data_url) => data_url,
                Err(e) => {
                    tracing::warn!(key, url = source_url, error = %e, "image fetch failed; using source locator");
                    return Resolved::PassThrough(source_url.to_string());
                }
            }
        };

        let stored = self.store.put(key, &data_url).await;
        if !stored {
            tracing::warn!(key, "serving uncached image; it will be fetched again next time");
        }
        Resolved::Fetched { data_url, stored }
    }

    async fn materialize(&self, source_url: &str) -> Result<String, Error> {
        let response = self.source.fetch(source_url).await?;
        if response.bytes.is_empty() {
            return Err(Error::NetworkFailure(format!("{}: empty body", response.final_url)));
        }

        let media_type = media_type_for(response.content_type.as_deref(), &response.bytes, response.final_url.path());
        if !media_type.starts_with("image/") {
            return Err(Error::NetworkFailure(format!(
                "{}: expected an image, got {media_type}",
                response.final_url
            )));
        }

        Ok(encode_data_url(&media_type, &response.bytes))
    }

    /// Warm the cache for every item, isolating failures.
    ///
    /// An item counts as failed when it could only be passed through.
    pub async fn preload(&self, items: &[Preset]) -> PreloadSummary {
        let semaphore = Arc::new(Semaphore::new(self.preload_concurrency));
        let mut join_set = JoinSet::new();

        for item in items.iter().cloned() {
            let cache = self.clone();
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (item.key, false);
                };
                let resolved = cache.fetch_and_cache(&item.url, &item.key).await;
                (item.key, resolved.is_materialized())
            });
        }

        let mut summary = PreloadSummary { total: items.len(), ..Default::default() };

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((key, true)) => {
                    tracing::debug!(key, "preloaded background");
                    summary.succeeded += 1;
                }
                Ok((key, false)) => {
                    tracing::debug!(key, "preload fell back to source");
                    summary.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "preload task failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(succeeded = summary.succeeded, total = summary.total, "background preload finished");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchResponse;
    use async_trait::async_trait;
    use backdrop_core::StoreLocation;
    use bytes::Bytes;
    use reqwest::{StatusCode, Url};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const PNG_BYTES: &[u8] = b"\x89PNG\x0D\x0A\x1A\x0A\x00\x00\x00\x0DIHDR";

    /// Serves PNG bytes for any locator not containing "broken".
    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    impl CountingSource {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageSource for CountingSource {
        async fn fetch(&self, locator: &str) -> Result<FetchResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if locator.contains("broken") {
                return Err(Error::NetworkFailure(format!("{locator}: status 404")));
            }
            let url = Url::parse(locator).map_err(|e| Error::InvalidUrl(e.to_string()))?;
            let (content_type, bytes) = if locator.contains("html") {
                (Some("text/html".to_string()), Bytes::from_static(b"<html></html>"))
            } else {
                (Some("image/png".to_string()), Bytes::from_static(PNG_BYTES))
            };
            Ok(FetchResponse {
                url: url.clone(),
                final_url: url,
                status: StatusCode::OK,
                content_type,
                bytes,
                fetch_ms: 1,
            })
        }
    }

    fn cache_with(location: StoreLocation) -> (ImageCache, Arc<CountingSource>) {
        let store = Arc::new(ImageStore::new(location, 1, Duration::from_millis(604_800_000)));
        let source = Arc::new(CountingSource::default());
        (ImageCache::new(store, source.clone()), source)
    }

    #[tokio::test]
    async fn test_second_call_served_from_store() {
        let (cache, source) = cache_with(StoreLocation::Memory);

        let first = cache.fetch_and_cache("https://example.com/bg1.png", "bg1").await;
        assert!(matches!(first, Resolved::Fetched { stored: true, .. }));
        assert!(first.locator().starts_with("data:image/png;base64,"));

        let second = cache.fetch_and_cache("https://example.com/bg1.png", "bg1").await;
        assert_eq!(second, Resolved::Cached(first.into_locator()));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_store_unavailable_still_serves_payload() {
        let (cache, source) = cache_with(StoreLocation::Disabled);

        let first = cache.fetch_and_cache("https://example.com/bg1.png", "bg1").await;
        assert!(matches!(first, Resolved::Fetched { stored: false, .. }));
        assert!(first.is_materialized());

        cache.fetch_and_cache("https://example.com/bg1.png", "bg1").await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_store_and_network_unavailable_passes_through() {
        let (cache, _) = cache_with(StoreLocation::Disabled);
        let url = "https://example.com/broken/bg1.png";

        let resolved = cache.fetch_and_cache(url, "bg1").await;
        assert_eq!(resolved, Resolved::PassThrough(url.to_string()));
        assert_eq!(resolved.locator(), url);
    }

    #[tokio::test]
    async fn test_non_image_body_passes_through() {
        let (cache, _) = cache_with(StoreLocation::Memory);
        let resolved = cache.fetch_and_cache("https://example.com/html/bg1.png", "bg1").await;
        assert!(!resolved.is_materialized());
        assert!(cache.get("bg1").await.is_none());
    }

    #[tokio::test]
    async fn test_data_url_source_skips_network() {
        let (cache, source) = cache_with(StoreLocation::Memory);
        let data_url = "data:image/png;base64,AAA";

        let resolved = cache.fetch_and_cache(data_url, "custom_1").await;
        assert_eq!(resolved, Resolved::Fetched { data_url: data_url.to_string(), stored: true });
        assert_eq!(cache.get("custom_1").await.as_deref(), Some(data_url));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_version_bump_refetches() {
        let (cache, source) = cache_with(StoreLocation::Memory);
        cache.fetch_and_cache("https://example.com/bg2.png", "bg2").await;

        cache.store().set_version(2);
        let resolved = cache.fetch_and_cache("https://example.com/bg2.png", "bg2").await;
        assert!(matches!(resolved, Resolved::Fetched { stored: true, .. }));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_preload_isolates_failures() {
        let (cache, _) = cache_with(StoreLocation::Memory);
        let cache = cache.with_preload_concurrency(2);
        let items = vec![
            Preset { key: "bg1".into(), url: "https://example.com/bg1.png".into() },
            Preset { key: "bg2".into(), url: "https://example.com/broken/bg2.png".into() },
            Preset { key: "bg3".into(), url: "https://example.com/bg3.png".into() },
            Preset { key: "bg4".into(), url: "https://example.com/bg4.png".into() },
        ];

        let summary = cache.preload(&items).await;
        assert_eq!(summary, PreloadSummary { total: 4, succeeded: 3, failed: 1 });
        assert!(cache.get("bg1").await.is_some());
        assert!(cache.get("bg2").await.is_none());
        assert!(cache.get("bg4").await.is_some());
    }

    #[tokio::test]
    async fn test_preload_empty() {
        let (cache, source) = cache_with(StoreLocation::Memory);
        assert_eq!(cache.preload(&[]).await, PreloadSummary::default());
        assert_eq!(source.calls(), 0);
    }
}
