//! Selection subcommands: select, upload, restore, init.

use std::path::Path;

use backdrop_client::{PreloadSummary, Resolved};
use backdrop_core::cache::settings::NO_BACKGROUND;
use backdrop_core::{Error, Selection};
use serde::Serialize;

use super::App;

/// An applied background.
#[derive(Debug, Clone, Serialize)]
pub struct Applied {
    pub key: String,
    pub source: &'static str,
    pub locator: String,
}

impl Applied {
    fn new(key: &str, resolved: Resolved) -> Self {
        Self { key: key.to_string(), source: resolved.source(), locator: resolved.into_locator() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectOutput {
    /// None when the selection was cleared.
    pub applied: Option<Applied>,
}

/// Select `key`. An empty `url` falls back to the preset of the same key.
pub async fn select_impl(app: &App, key: &str, url: &str) -> Result<SelectOutput, Error> {
    if key.trim().is_empty() {
        return Err(Error::InvalidInput("background key must not be empty".into()));
    }

    let selector = app.selector();
    let url = match (url.trim().is_empty(), selector.preset(key)) {
        (true, Some(preset)) => preset.url.as_str(),
        (true, None) if key != NO_BACKGROUND => {
            return Err(Error::InvalidInput(format!("no url given and no preset named {key:?}")));
        }
        _ => url,
    };

    let applied = selector.select(key, url).await.map(|resolved| Applied::new(key, resolved));
    Ok(SelectOutput { applied })
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutput {
    pub key: String,
    pub file_bytes: usize,
    pub stored: bool,
}

/// Read a local image, cache it under its content key, and select it.
pub async fn upload_impl(app: &App, file: &Path) -> Result<UploadOutput, Error> {
    let bytes = tokio::fs::read(file)
        .await
        .map_err(|e| Error::InvalidInput(format!("{}: {e}", file.display())))?;
    let file_name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();

    let Selection { key, .. } = app.selector().upload(&bytes, file_name).await?;
    let stored = app.cache().get(&key).await.is_some();
    Ok(UploadOutput { key, file_bytes: bytes.len(), stored })
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutput {
    /// None when nothing was saved.
    pub applied: Option<Applied>,
}

pub async fn restore_impl(app: &App) -> RestoreOutput {
    let applied = app
        .selector()
        .restore()
        .await
        .map(|(selection, resolved)| Applied::new(&selection.key, resolved));
    RestoreOutput { applied }
}

#[derive(Debug, Clone, Serialize)]
pub struct InitOutput {
    pub restored: Option<Applied>,
    pub preload: PreloadSummary,
}

/// Start-up sequence: restore, then wait for the delayed preset warm.
pub async fn init_impl(app: &App) -> InitOutput {
    let startup = app.selector().init().await;
    let restored = startup
        .restored
        .map(|(selection, resolved)| Applied::new(&selection.key, resolved));

    let preload = startup.preload.await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "preset warm task failed");
        PreloadSummary::default()
    });

    InitOutput { restored, preload }
}
