//! Small persisted settings.
//!
//! Records the currently selected background so it can be re-applied at
//! start-up.

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Setting holding the selected background key.
pub const SELECTED_BACKGROUND: &str = "selectedBackground";

/// Setting holding the selected background locator.
pub const SELECTED_BACKGROUND_URL: &str = "selectedBackgroundUrl";

/// Key that means "no background".
pub const NO_BACKGROUND: &str = "none";

/// The currently selected background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub key: String,
    pub url: String,
}

impl CacheDb {
    /// Read a single setting.
    pub async fn get_setting(&self, name: &str) -> Result<Option<String>, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row("SELECT value FROM settings WHERE name = ?1", params![name], |row| {
                    row.get(0)
                });

                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Write a single setting.
    pub async fn put_setting(&self, name: &str, value: &str) -> Result<(), Error> {
        let name = name.to_string();
        let value = value.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO settings (name, value) VALUES (?1, ?2)
                    ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                    params![name, value],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Load the saved selection.
    ///
    /// Returns None unless both settings are present and the key is not `none`.
    pub async fn load_selection(&self) -> Result<Option<Selection>, Error> {
        let key = self.get_setting(SELECTED_BACKGROUND).await?;
        let url = self.get_setting(SELECTED_BACKGROUND_URL).await?;

        Ok(match (key, url) {
            (Some(key), Some(url)) if key != NO_BACKGROUND && !url.is_empty() => Some(Selection { key, url }),
            _ => None,
        })
    }

    /// Save the selection, writing both settings in one transaction.
    pub async fn save_selection(&self, selection: &Selection) -> Result<(), Error> {
        let selection = selection.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for (name, value) in [(SELECTED_BACKGROUND, &selection.key), (SELECTED_BACKGROUND_URL, &selection.url)] {
                    tx.execute(
                        "INSERT INTO settings (name, value) VALUES (?1, ?2)
                        ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                        params![name, value],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove the saved selection.
    pub async fn clear_selection(&self) -> Result<(), Error> {
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "DELETE FROM settings WHERE name IN (?1, ?2)",
                    params![SELECTED_BACKGROUND, SELECTED_BACKGROUND_URL],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
