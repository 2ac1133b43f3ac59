//! Unified error types for backdrop.
//!
//! Every variant renders with a stable code prefix so log lines and CLI
//! output can be matched on without parsing the message.

use tokio_rusqlite::rusqlite;

/// Unified error type for the image cache, its store, and the fetch pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Storage is disabled or the database cannot be opened at all.
    #[error("STORE_UNAVAILABLE: {0}")]
    StoreUnavailable(String),

    /// Another connection holds a conflicting lock on the database.
    #[error("STORE_BLOCKED: {0}")]
    StoreBlocked(String),

    /// The connection was closed underneath us.
    #[error("STORE_CLOSED")]
    StoreClosed,

    /// The database was upgraded by a newer build.
    #[error("STORE_VERSION_CHANGED: schema {found} is newer than supported {supported}")]
    SchemaVersionChanged { found: i64, supported: i64 },

    /// A statement or transaction did not commit.
    #[error("TRANSACTION_ABORTED: {0}")]
    TransactionAborted(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("MIGRATION_FAILED: {0}")]
    MigrationFailed(String),

    /// Source fetch failed (transport error or non-success status).
    #[error("NETWORK_FAILURE: {0}")]
    NetworkFailure(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Invalid or unresolvable locator.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Invalid input parameters (e.g., empty key).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Stable code for this error, matching the display prefix.
    pub fn code(&self) -> &'static str {
        match self {
            Error::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Error::StoreBlocked(_) => "STORE_BLOCKED",
            Error::StoreClosed => "STORE_CLOSED",
            Error::SchemaVersionChanged { .. } => "STORE_VERSION_CHANGED",
            Error::TransactionAborted(_) => "TRANSACTION_ABORTED",
            Error::MigrationFailed(_) => "MIGRATION_FAILED",
            Error::NetworkFailure(_) => "NETWORK_FAILURE",
            Error::FetchTooLarge(_) => "FETCH_TOO_LARGE",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::InvalidInput(_) => "INVALID_INPUT",
        }
    }

    /// Whether the held connection must be dropped after this error.
    pub fn invalidates_connection(&self) -> bool {
        matches!(self, Error::StoreClosed | Error::SchemaVersionChanged { .. })
    }

    /// Whether a statement failed because another connection holds a lock.
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, Error::TransactionAborted(tokio_rusqlite::Error::Error(e)) if is_lock_conflict(e))
    }
}

/// SQLITE_BUSY or SQLITE_LOCKED.
pub(crate) fn is_lock_conflict(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::StoreClosed,
            tokio_rusqlite::Error::Close(c) => Error::TransactionAborted(tokio_rusqlite::Error::Close(c)),
            _ => Error::StoreClosed,
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        match err {
            tokio_rusqlite::Error::ConnectionClosed => Error::StoreClosed,
            other => Error::TransactionAborted(other),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::TransactionAborted(tokio_rusqlite::Error::Error(err))
    }
}
