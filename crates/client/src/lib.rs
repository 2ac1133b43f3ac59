//! Client code for backdrop.
//!
//! This crate provides the image fetch pipeline, data URL handling, the
//! background image cache, and background selection shared by the CLI.

pub mod backgrounds;
pub mod data_url;
pub mod fetch;
pub mod image_cache;

pub use backgrounds::{BackgroundSelector, CacheCleared, Startup};
pub use fetch::{FetchClient, FetchConfig, FetchResponse, ImageSource};
pub use image_cache::{ImageCache, PreloadSummary, Resolved};
