//! Core types and shared functionality for backdrop.
//!
//! This crate provides:
//! - Image cache implementation with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheEntry, ImageStore, Selection, StoreLocation};
pub use config::{AppConfig, ConfigError, Preset};
pub use error::Error;
