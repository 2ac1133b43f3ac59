//! Versioned, expiring image store with a self-healing connection.
//!
//! [`ImageStore`] owns the single [`CacheDb`] handle. The handle is opened on
//! first use, shared by every later call, and dropped when the connection
//! closes underneath us or the schema moves past this build; the next call
//! opens it again.
//!
//! Each operation comes in two flavours. `try_*` returns `Result<_, Error>`;
//! the plain form recovers locally (lookups resolve to `None`, writes to
//! `false`) and logs the failure.

use super::connection::CacheDb;
use super::entries::{CacheEntry, now_millis};
use super::key::namespaced;
use super::settings::Selection;
use crate::Error;
use crate::config::AppConfig;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// SQLite database file.
    File(PathBuf),
    /// Private in-memory database, lost on reconnect.
    Memory,
    /// No persistent storage; every operation reports `STORE_UNAVAILABLE`.
    Disabled,
}

/// Persistent image store.
#[derive(Debug)]
pub struct ImageStore {
    location: StoreLocation,
    version: AtomicI64,
    ttl: Duration,
    handle: Mutex<Option<CacheDb>>,
}

impl ImageStore {
    /// Create a store. Nothing is opened until the first operation.
    pub fn new(location: StoreLocation, version: i64, ttl: Duration) -> Self {
        Self { location, version: AtomicI64::new(version), ttl, handle: Mutex::new(None) }
    }

    /// Create a store from application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let location = if config.cache_enabled {
            StoreLocation::File(config.db_path.clone())
        } else {
            StoreLocation::Disabled
        };
        Self::new(location, config.cache_version, config.ttl())
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current cache version.
    pub fn version(&self) -> i64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Change the cache version. Entries written under any other version
    /// stop being returned immediately.
    pub fn set_version(&self, version: i64) {
        let previous = self.version.swap(version, Ordering::SeqCst);
        if previous != version {
            tracing::info!(previous, version, "cache version changed");
        }
    }

    /// Connect to the underlying database, reusing the live handle.
    ///
    /// Concurrent callers queue on one lock, so only one open is ever in
    /// flight and everyone behind it receives the handle it produced.
    pub async fn connect(&self) -> Result<CacheDb, Error> {
        let mut handle = self.handle.lock().await;

        if let Some(db) = handle.clone() {
            match db.verify().await {
                Ok(()) => return Ok(db),
                Err(Error::StoreClosed) => {
                    tracing::warn!("store connection closed unexpectedly; reconnecting");
                    *handle = None;
                }
                Err(e) => {
                    if e.invalidates_connection() {
                        tracing::warn!(error = %e, "dropping store connection");
                        *handle = None;
                    }
                    return Err(e);
                }
            }
        }

        let db = match &self.location {
            StoreLocation::File(path) => CacheDb::open(path).await?,
            StoreLocation::Memory => CacheDb::open_in_memory().await?,
            StoreLocation::Disabled => {
                return Err(Error::StoreUnavailable("persistent storage is disabled".into()));
            }
        };

        tracing::debug!(location = ?self.location, "store connected");
        *handle = Some(db.clone());
        Ok(db)
    }

    /// Whether a handle is currently held.
    pub async fn is_connected(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Close and forget the held handle.
    pub async fn disconnect(&self) {
        let taken = self.handle.lock().await.take();
        if let Some(db) = taken
            && let Err(e) = db.close().await
        {
            tracing::warn!(error = %e, "error while closing store");
        }
    }

    async fn invalidate(&self) {
        self.handle.lock().await.take();
    }

    /// Drop the handle if `result` carries a connection-fatal error.
    async fn settle<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(e) = &result
            && e.invalidates_connection()
        {
            tracing::warn!(error = %e, "dropping store connection");
            self.invalidate().await;
        }
        result
    }

    /// Look up a valid payload.
    ///
    /// A version-mismatched or expired entry is deleted before returning
    /// `None`, and only if it is still the row that was read.
    pub async fn try_get(&self, key: &str) -> Result<Option<String>, Error> {
        ensure_key(key)?;
        let db = self.connect().await?;
        let result = self.lookup(&db, &namespaced(key)).await;
        self.settle(result).await
    }

    async fn lookup(&self, db: &CacheDb, stored_key: &str) -> Result<Option<String>, Error> {
        let Some(entry) = db.get_entry(stored_key).await? else {
            tracing::debug!(key = stored_key, "cache miss");
            return Ok(None);
        };

        let version = self.version();
        if entry.is_valid(version, now_millis(), self.ttl) {
            tracing::debug!(key = stored_key, "cache hit");
            return Ok(Some(entry.data));
        }

        tracing::debug!(
            key = stored_key,
            entry_version = entry.version,
            version,
            timestamp = entry.timestamp,
            "stale cache entry"
        );
        match db.delete_entry_if_unchanged(&entry).await {
            Ok(_) => {}
            Err(e) if e.invalidates_connection() => return Err(e),
            Err(e) => tracing::warn!(key = stored_key, error = %e, "failed to delete stale entry"),
        }
        Ok(None)
    }

    /// Look up a valid payload, resolving every failure to `None`.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self.try_get(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Store a payload under the current version, replacing any prior entry.
    pub async fn try_put(&self, key: &str, data: &str) -> Result<(), Error> {
        ensure_key(key)?;
        let db = self.connect().await?;
        let entry = CacheEntry::new(namespaced(key), data, self.version());
        let result = db.upsert_entry(&entry).await;
        self.settle(result).await?;
        tracing::info!(key, version = entry.version, bytes = entry.data.len(), "cached image");
        Ok(())
    }

    /// Store a payload, returning whether it was written.
    pub async fn put(&self, key: &str, data: &str) -> bool {
        match self.try_put(key, data).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache write failed");
                false
            }
        }
    }

    /// Delete the entry for `key`. Returns whether a row existed.
    pub async fn try_evict(&self, key: &str) -> Result<bool, Error> {
        ensure_key(key)?;
        let db = self.connect().await?;
        let result = db.delete_entry(&namespaced(key)).await;
        self.settle(result).await
    }

    /// Delete the entry for `key`. Evicting an absent key succeeds.
    pub async fn evict(&self, key: &str) -> bool {
        match self.try_evict(key).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache evict failed");
                false
            }
        }
    }

    /// Delete every entry, returning how many were removed.
    pub async fn try_clear_all(&self) -> Result<u64, Error> {
        let db = self.connect().await?;
        let result = db.clear_entries().await;
        let removed = self.settle(result).await?;
        tracing::info!(removed, "cleared image cache");
        Ok(removed)
    }

    /// Delete every entry, returning whether the clear committed.
    pub async fn clear_all(&self) -> bool {
        match self.try_clear_all().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "cache clear failed");
                false
            }
        }
    }

    /// Number of stored entries, including stale ones not yet looked up.
    pub async fn try_entry_count(&self) -> Result<u64, Error> {
        let db = self.connect().await?;
        let result = db.count_entries().await;
        self.settle(result).await
    }

    /// Saved background selection, if any.
    pub async fn selection(&self) -> Option<Selection> {
        let result = match self.connect().await {
            Ok(db) => {
                let loaded = db.load_selection().await;
                self.settle(loaded).await
            }
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to read saved selection");
            None
        })
    }

    /// Persist the background selection.
    pub async fn save_selection(&self, selection: &Selection) -> bool {
        let result = match self.connect().await {
            Ok(db) => {
                let saved = db.save_selection(selection).await;
                self.settle(saved).await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %selection.key, error = %e, "failed to save selection");
                false
            }
        }
    }

    /// Forget the background selection.
    pub async fn clear_selection(&self) -> bool {
        let result = match self.connect().await {
            Ok(db) => {
                let cleared = db.clear_selection().await;
                self.settle(cleared).await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "failed to clear selection");
                false
            }
        }
    }
}

fn ensure_key(key: &str) -> Result<(), Error> {
    if key.trim().is_empty() {
        return Err(Error::InvalidInput("cache key must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::migrations::supported_version;
    use crate::config::DEFAULT_TTL_MS;

    const PNG: &str = "data:image/png;base64,AAA";

    fn memory_store() -> ImageStore {
        ImageStore::new(StoreLocation::Memory, 1, Duration::from_millis(DEFAULT_TTL_MS))
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = memory_store();
        assert!(store.put("bg1", PNG).await);
        assert_eq!(store.get("bg1").await.as_deref(), Some(PNG));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = memory_store();
        assert!(store.get("bg1").await.is_none());
    }

    #[tokio::test]
    async fn test_evict_then_get() {
        let store = memory_store();
        store.put("bg1", PNG).await;

        assert!(store.evict("bg1").await);
        assert!(store.get("bg1").await.is_none());
        assert!(store.evict("bg1").await);
    }

    #[tokio::test]
    async fn test_version_bump_hides_entry() {
        let store = memory_store();
        store.put("bg2", PNG).await;

        store.set_version(2);
        assert!(store.get("bg2").await.is_none());

        let db = store.connect().await.unwrap();
        assert!(db.get_entry(&namespaced("bg2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent() {
        let store = memory_store();
        let db = store.connect().await.unwrap();
        let old = CacheEntry {
            timestamp: now_millis() - DEFAULT_TTL_MS as i64 - 1,
            ..CacheEntry::new(namespaced("bg1"), PNG, 1)
        };
        db.upsert_entry(&old).await.unwrap();

        assert!(store.get("bg1").await.is_none());
        assert_eq!(db.count_entries().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_entry_at_ttl_boundary_is_absent() {
        let store = memory_store();
        let db = store.connect().await.unwrap();
        let old = CacheEntry {
            timestamp: now_millis() - DEFAULT_TTL_MS as i64,
            ..CacheEntry::new(namespaced("bg1"), PNG, 1)
        };
        db.upsert_entry(&old).await.unwrap();

        assert!(store.get("bg1").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_all() {
        let store = memory_store();
        store.put("bg1", PNG).await;
        store.put("bg2", PNG).await;

        assert_eq!(store.try_clear_all().await.unwrap(), 2);
        assert!(store.get("bg1").await.is_none());
        assert!(store.get("bg2").await.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_single_entry() {
        let store = memory_store();
        store.put("bg1", PNG).await;
        store.put("bg1", "data:image/png;base64,BBB").await;

        assert_eq!(store.try_entry_count().await.unwrap(), 1);
        assert_eq!(store.get("bg1").await.as_deref(), Some("data:image/png;base64,BBB"));
    }

    #[tokio::test]
    async fn test_disabled_store_degrades() {
        let store = ImageStore::new(StoreLocation::Disabled, 1, Duration::from_millis(DEFAULT_TTL_MS));

        assert!(matches!(store.connect().await, Err(Error::StoreUnavailable(_))));
        assert!(!store.put("bg1", PNG).await);
        assert!(store.get("bg1").await.is_none());
        assert!(!store.evict("bg1").await);
        assert!(!store.clear_all().await);
        assert!(store.selection().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let store = memory_store();
        assert!(matches!(store.try_put(" ", PNG).await, Err(Error::InvalidInput(_))));
        assert!(store.get("").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_connects_share_one_handle() {
        let store = memory_store();
        let (a, b, c) = tokio::join!(store.connect(), store.connect(), store.connect());
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        a.upsert_entry(&CacheEntry::new(namespaced("bg1"), PNG, 1)).await.unwrap();
        assert!(b.get_entry(&namespaced("bg1")).await.unwrap().is_some());
        assert!(c.get_entry(&namespaced("bg1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reconnects_after_unexpected_close() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(
            StoreLocation::File(dir.path().join("cache.sqlite")),
            1,
            Duration::from_millis(DEFAULT_TTL_MS),
        );
        store.put("bg1", PNG).await;

        store.connect().await.unwrap().close().await.unwrap();

        assert_eq!(store.get("bg1").await.as_deref(), Some(PNG));
        assert!(store.is_connected().await);
    }

    #[tokio::test]
    async fn test_connect_blocked_by_foreign_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");
        let holder = tokio_rusqlite::rusqlite::Connection::open(&path).unwrap();
        holder
            .execute_batch("PRAGMA journal_mode=WAL; CREATE TABLE other(x); BEGIN IMMEDIATE; INSERT INTO other VALUES (1);")
            .unwrap();

        let store = ImageStore::new(StoreLocation::File(path), 1, Duration::from_millis(DEFAULT_TTL_MS));
        assert!(matches!(store.connect().await, Err(Error::StoreBlocked(_))));
        assert!(!store.is_connected().await);
        assert!(!store.put("bg1", PNG).await);

        holder.execute_batch("COMMIT").unwrap();
        assert!(store.put("bg1", PNG).await);
        assert_eq!(store.get("bg1").await.as_deref(), Some(PNG));
    }

    #[tokio::test]
    async fn test_newer_schema_drops_handle() {
        let store = memory_store();
        let db = store.connect().await.unwrap();
        let future = supported_version() + 1;
        db.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, 'later')",
                    tokio_rusqlite::params![future],
                )
            })
            .await
            .unwrap();

        let result = store.connect().await;
        assert!(matches!(result, Err(Error::SchemaVersionChanged { found, .. }) if found == future));
        assert!(!store.is_connected().await);
    }

    #[tokio::test]
    async fn test_disconnect_then_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(
            StoreLocation::File(dir.path().join("cache.sqlite")),
            1,
            Duration::from_millis(DEFAULT_TTL_MS),
        );
        store.put("bg1", PNG).await;

        store.disconnect().await;
        assert!(!store.is_connected().await);
        assert_eq!(store.get("bg1").await.as_deref(), Some(PNG));
    }

    #[tokio::test]
    async fn test_selection_roundtrip() {
        let store = memory_store();
        let selection = Selection { key: "bg3".into(), url: "https://example.com/bg3.jpg".into() };

        assert!(store.save_selection(&selection).await);
        assert_eq!(store.selection().await, Some(selection));

        assert!(store.clear_selection().await);
        assert!(store.selection().await.is_none());
    }
}
