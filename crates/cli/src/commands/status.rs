//! Store inspection: status and version.

use backdrop_core::{Error, Selection, StoreLocation};
use serde::Serialize;

use super::App;

#[derive(Debug, Clone, Serialize)]
pub struct StatusOutput {
    pub location: String,
    pub available: bool,
    pub version: i64,
    pub ttl_ms: u64,
    /// Stored rows, including stale ones not yet looked up.
    pub entries: Option<u64>,
    pub selection: Option<Selection>,
    /// Error code when the store could not be reached.
    pub error: Option<&'static str>,
}

/// Report the store state. An unreachable store is reported, not an error.
pub async fn status_impl(app: &App) -> StatusOutput {
    let store = app.cache().store();
    let location = match store.location() {
        StoreLocation::File(path) => path.display().to_string(),
        StoreLocation::Memory => ":memory:".to_string(),
        StoreLocation::Disabled => "disabled".to_string(),
    };

    let (entries, error) = match store.try_entry_count().await {
        Ok(count) => (Some(count), None),
        Err(e) => (None, Some(e.code())),
    };

    StatusOutput {
        location,
        available: error.is_none(),
        version: store.version(),
        ttl_ms: store.ttl().as_millis() as u64,
        entries,
        selection: store.selection().await,
        error,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionOutput {
    pub version: i64,
    pub previous: i64,
}

/// Show the cache version, optionally replacing it for this run.
pub async fn version_impl(app: &App, set: Option<i64>) -> Result<VersionOutput, Error> {
    let store = app.cache().store();
    let previous = store.version();

    if let Some(version) = set {
        if version < 1 {
            return Err(Error::InvalidInput(format!("cache version must be >= 1, got {version}")));
        }
        store.set_version(version);
    }

    Ok(VersionOutput { version: store.version(), previous })
}
