//! Database schema migrations.
//!
//! Uses a simple version table approach to track applied migrations.
//! Each migration is a SQL batch that transforms the schema.

use std::num::ParseIntError;

use super::Error;
use crate::error::is_lock_conflict;
use tokio_rusqlite::{Connection, params};

/// Migration list: (version, SQL).
///
/// Migrations must be applied in order. All migrations are idempotent
/// using CREATE IF NOT EXISTS, so the tables are created on first use only.
const MIGRATIONS: &[(&str, &str)] = &[
    ("1", include_str!("../../migrations/001_images.sql")),
    ("2", include_str!("../../migrations/002_settings.sql")),
];

/// Highest schema version this build knows how to use.
pub fn supported_version() -> i64 {
    MIGRATIONS.len() as i64
}

/// Run any pending migrations.
///
/// Creates the `_migrations` table if it doesn't exist, checks the current
/// version, and applies any migrations that haven't been run yet.
///
/// # Errors
///
/// Returns [`Error::SchemaVersionChanged`] if the database was migrated by a
/// newer build, or an error if a migration SQL fails to execute.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(Error::from)?;

        let current = current_version(conn)?;
        let supported = supported_version();
        if current > supported {
            return Err(Error::SchemaVersionChanged { found: current, supported });
        }

        for (version, sql) in MIGRATIONS {
            let version_num: i64 = version
                .parse()
                .map_err(|e: ParseIntError| Error::MigrationFailed(e.to_string()))?;
            if version_num > current {
                conn.execute_batch(sql).map_err(|e| {
                    if is_lock_conflict(&e) {
                        Error::from(e)
                    } else {
                        Error::MigrationFailed(format!("version {version_num}: {e}"))
                    }
                })?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                    params![version_num, chrono::Utc::now().to_rfc3339()],
                )
                .map_err(Error::from)?;
                tracing::debug!(version = version_num, "applied migration");
            }
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

/// Check that the schema has not moved past this build since we connected.
pub async fn verify(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        let current = current_version(conn)?;
        let supported = supported_version();
        if current > supported {
            return Err(Error::SchemaVersionChanged { found: current, supported });
        }
        Ok(())
    })
    .await
    .map_err(Error::from)
}

fn current_version(conn: &tokio_rusqlite::rusqlite::Connection) -> Result<i64, Error> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))
        .map_err(Error::from)
}
