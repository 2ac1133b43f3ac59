//! Image entry CRUD operations.
//!
//! Provides functions for creating, reading, and deleting cached image
//! entries. Keys passed here are already namespaced.

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A cached image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Data URL payload.
    pub data: String,
    pub version: i64,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
}

impl CacheEntry {
    /// Build an entry stamped with the current time.
    pub fn new(key: impl Into<String>, data: impl Into<String>, version: i64) -> Self {
        Self { key: key.into(), data: data.into(), version, timestamp: now_millis() }
    }

    /// Whether this entry may be returned to a caller.
    ///
    /// Valid iff the version matches and `now - timestamp < ttl`.
    pub fn is_valid(&self, current_version: i64, now_ms: i64, ttl: Duration) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.version == current_version && now_ms.saturating_sub(self.timestamp) < ttl_ms
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl CacheDb {
    /// Insert or replace an entry.
    ///
    /// Uses UPSERT semantics so exactly one row exists per key.
    pub async fn upsert_entry(&self, entry: &CacheEntry) -> Result<(), Error> {
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO images (key, data, version, timestamp)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(key) DO UPDATE SET
                        data = excluded.data,
                        version = excluded.version,
                        timestamp = excluded.timestamp",
                    params![&entry.key, &entry.data, entry.version, entry.timestamp],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by key.
    ///
    /// Returns None if the key doesn't exist. Validity is not checked here.
    pub async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let result = conn.query_row(
                    "SELECT key, data, version, timestamp FROM images WHERE key = ?1",
                    params![key],
                    |row| {
                        Ok(CacheEntry { key: row.get(0)?, data: row.get(1)?, version: row.get(2)?, timestamp: row.get(3)? })
                    },
                );

                match result {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete an entry by key.
    ///
    /// Returns true if a row was removed. Deleting a missing key is not an error.
    pub async fn delete_entry(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM images WHERE key = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete an entry only if it is still the row that was read.
    ///
    /// A write that lands between the read and this delete changes the
    /// version or timestamp, so the newer row survives.
    pub async fn delete_entry_if_unchanged(&self, entry: &CacheEntry) -> Result<bool, Error> {
        let (key, version, timestamp) = (entry.key.clone(), entry.version, entry.timestamp);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM images WHERE key = ?1 AND version = ?2 AND timestamp = ?3",
                    params![key, version, timestamp],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry.
    ///
    /// Returns the number of deleted entries.
    pub async fn clear_entries(&self) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM images", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Count stored entries, valid or not.
    pub async fn count_entries(&self) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
