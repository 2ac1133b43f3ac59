//! Cache subcommands: get, put, fetch, evict, clear, preload.

use backdrop_client::data_url::parse_data_url;
use backdrop_client::{CacheCleared, PreloadSummary, Resolved};
use backdrop_core::{Error, Preset};
use serde::Serialize;

use super::App;

#[derive(Debug, Clone, Serialize)]
pub struct GetOutput {
    pub key: String,
    pub hit: bool,
    pub data: Option<String>,
}

/// Read a cached payload. A miss is a successful lookup with `hit: false`.
pub async fn get_impl(app: &App, key: &str) -> Result<GetOutput, Error> {
    let data = app.cache().store().try_get(key).await?;
    Ok(GetOutput { key: key.to_string(), hit: data.is_some(), data })
}

#[derive(Debug, Clone, Serialize)]
pub struct PutOutput {
    pub key: String,
    pub version: i64,
    pub bytes: usize,
    /// Media type when the payload is a decodable data URL.
    pub media_type: Option<String>,
}

pub async fn put_impl(app: &App, key: &str, data: &str) -> Result<PutOutput, Error> {
    let store = app.cache().store();
    store.try_put(key, data).await?;
    let media_type = parse_data_url(data).map(|(media_type, _)| media_type);
    Ok(PutOutput { key: key.to_string(), version: store.version(), bytes: data.len(), media_type })
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchOutput {
    pub key: String,
    /// `cache`, `fetched`, or `passthrough`.
    pub source: &'static str,
    /// False when the payload could not be written back.
    pub stored: bool,
    pub locator: String,
}

/// Resolve through the cache. Never fails for an unreachable image; the
/// output reports a pass-through instead.
pub async fn fetch_impl(app: &App, url: &str, key: &str) -> Result<FetchOutput, Error> {
    if key.trim().is_empty() {
        return Err(Error::InvalidInput("cache key must not be empty".into()));
    }

    let resolved = app.cache().fetch_and_cache(url, key).await;
    let stored = match &resolved {
        Resolved::Cached(_) => true,
        Resolved::Fetched { stored, .. } => *stored,
        Resolved::PassThrough(_) => false,
    };

    Ok(FetchOutput { key: key.to_string(), source: resolved.source(), stored, locator: resolved.into_locator() })
}

#[derive(Debug, Clone, Serialize)]
pub struct EvictOutput {
    pub key: String,
    /// Whether an entry existed before the evict.
    pub existed: bool,
}

pub async fn evict_impl(app: &App, key: &str) -> Result<EvictOutput, Error> {
    let existed = app.cache().store().try_evict(key).await?;
    Ok(EvictOutput { key: key.to_string(), existed })
}

pub async fn clear_impl(app: &App) -> Result<CacheCleared, Error> {
    app.selector().clear_cache().await
}

/// Warm the cache for `items` (`key=url`), or the configured presets when
/// none are given.
pub async fn preload_impl(app: &App, items: &[String]) -> Result<PreloadSummary, Error> {
    let presets = if items.is_empty() {
        app.config
            .require_presets()
            .map_err(|e| Error::InvalidInput(e.to_string()))?
            .to_vec()
    } else {
        items.iter().map(String::as_str).map(parse_item).collect::<Result<Vec<_>, _>>()?
    };

    Ok(app.cache().preload(&presets).await)
}

fn parse_item(item: &str) -> Result<Preset, Error> {
    match item.split_once('=') {
        Some((key, url)) if !key.trim().is_empty() && !url.trim().is_empty() => {
            Ok(Preset { key: key.trim().to_string(), url: url.trim().to_string() })
        }
        _ => Err(Error::InvalidInput(format!("expected key=url, got {item:?}"))),
    }
}
