//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite database, applying required pragmas
//! for performance and concurrency (WAL mode), and running migrations.

use super::migrations;
use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::{self, ErrorCode};

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Cache database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Cloning shares the same connection.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
}

impl CacheDb {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    ///
    /// # Errors
    ///
    /// - [`Error::StoreUnavailable`] if the file cannot be opened.
    /// - [`Error::StoreBlocked`] if another connection holds a conflicting lock.
    /// - [`Error::SchemaVersionChanged`] if a newer build migrated the file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)
            .await
            .map_err(|e| classify_open_error(e.into(), &path.display().to_string()))?;

        Self::prepare(conn, &path.display().to_string()).await
    }

    /// Open an in-memory database for testing.
    ///
    /// Creates a temporary in-memory SQLite database with the same
    /// pragma configuration as file-based databases.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| classify_open_error(e.into(), ":memory:"))?;

        Self::prepare(conn, ":memory:").await
    }

    async fn prepare(conn: Connection, target: &str) -> Result<Self, Error> {
        conn.call(|conn| conn.execute_batch(PRAGMAS))
            .await
            .map_err(|e| classify_open_error(e, target))?;

        migrations::run(&conn).await.map_err(|e| {
            if e.is_lock_conflict() {
                blocked(target)
            } else {
                e
            }
        })?;

        Ok(Self { conn })
    }

    /// Confirm the connection is still usable and the schema is one we understand.
    pub async fn verify(&self) -> Result<(), Error> {
        migrations::verify(&self.conn).await
    }

    /// Close the underlying connection.
    ///
    /// Other clones of this handle observe [`Error::StoreClosed`] afterwards.
    pub async fn close(self) -> Result<(), Error> {
        self.conn.close().await.map_err(Error::from)
    }
}

fn blocked(target: &str) -> Error {
    tracing::warn!(target, "store is locked by another connection");
    Error::StoreBlocked(format!("{target} is locked by another connection"))
}

/// Sort an open-time failure into blocked, unavailable, or aborted.
fn classify_open_error(err: tokio_rusqlite::Error, target: &str) -> Error {
    let code = match &err {
        tokio_rusqlite::Error::Error(e) => e.sqlite_error_code(),
        tokio_rusqlite::Error::ConnectionClosed => return Error::StoreClosed,
        _ => None,
    };

    match code {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => blocked(target),
        Some(
            ErrorCode::CannotOpen
            | ErrorCode::PermissionDenied
            | ErrorCode::ReadOnly
            | ErrorCode::NotADatabase
            | ErrorCode::SystemIoFailure,
        ) => Error::StoreUnavailable(format!("{target}: {err}")),
        _ => match err {
            tokio_rusqlite::Error::Error(rusqlite::Error::SqliteFailure(_, _)) => {
                Error::StoreUnavailable(format!("{target}: {err}"))
            }
            other => Error::TransactionAborted(other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let version = db
            .conn
            .call(|conn| conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0)))
            .await
            .unwrap();
        assert!(!version.is_empty());
    }

    #[tokio::test]
    async fn test_open_missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("cache.sqlite");

        let result = CacheDb::open(&path).await;
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_open_file_creates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");

        let db = CacheDb::open(&path).await.unwrap();
        db.verify().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_open_during_foreign_write_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");
        let holder = rusqlite::Connection::open(&path).unwrap();
        holder
            .execute_batch("PRAGMA journal_mode=WAL; CREATE TABLE other(x); BEGIN IMMEDIATE; INSERT INTO other VALUES (1);")
            .unwrap();

        let result = CacheDb::open(&path).await;
        assert!(matches!(result, Err(Error::StoreBlocked(_))), "{result:?}");

        holder.execute_batch("COMMIT").unwrap();
        CacheDb::open(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_handle_reports_store_closed() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let clone = db.clone();
        db.close().await.unwrap();

        let result = clone.verify().await;
        assert!(matches!(result, Err(Error::StoreClosed)));
    }
}
