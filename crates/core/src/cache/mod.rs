//! SQLite-backed cache for background images.
//!
//! This module provides a persistent, versioned, expiring image cache using
//! SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Namespaced string keys, one row per key
//! - Lazy eviction of version-mismatched or expired entries
//! - Automatic schema migrations
//! - Small persisted settings for the current background selection

pub mod connection;
pub mod entries;
pub mod key;
pub mod migrations;
pub mod settings;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CacheEntry;
pub use settings::Selection;
pub use store::{ImageStore, StoreLocation};
