//! HTTP fetch pipeline for source images.
//!
//! ### URL Resolution
//! - Relative locators are joined onto the configured base URL
//! - Trim whitespace, ensure scheme (default: `https`)
//! - Lowercase host, remove fragments
//!
//! ### Caching directive
//! Every request carries `Cache-Control: max-stale`, so any HTTP cache on the
//! path may answer with a stored copy regardless of age.
//!
//! ### Limits
//! - Max redirects: 5
//! - Max body bytes: 10MB (configurable)

pub mod url;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::Url;
use reqwest::{Client, StatusCode, header};
use std::time::{Duration, Instant};

pub use url::{UrlError, canonicalize, resolve};

use backdrop_core::{AppConfig, Error};

/// Request-side cache directive asking caches to serve any stored copy.
pub const CACHE_DIRECTIVE: &str = "max-stale";

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "backdrop/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Base URL for relative locators
    pub base_url: Option<Url>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "backdrop/0.1".to_string(),
            max_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            base_url: None,
        }
    }
}

impl FetchConfig {
    /// Build fetch settings from the application configuration.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let base_url = config
            .base_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| Error::InvalidUrl(format!("base_url: {e}")))?;

        Ok(Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            base_url,
            ..Default::default()
        })
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The resolved URL requested
    pub url: Url,
    /// The final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Content-Type header
    pub content_type: Option<String>,
    /// Response body bytes
    pub bytes: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

/// Where image bytes come from.
///
/// [`FetchClient`] is the network implementation; the cache only depends on
/// this trait.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Retrieve the bytes behind `locator`.
    async fn fetch(&self, locator: &str) -> Result<FetchResponse, Error>;
}

/// HTTP fetch client for source images.
#[derive(Debug)]
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::NetworkFailure(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Resolve a locator against the configured base URL.
    pub fn resolve(&self, locator: &str) -> Result<Url, Error> {
        resolve(locator, self.config.base_url.as_ref()).map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    /// Fetch an image, returning raw bytes and metadata.
    ///
    /// Rejects non-success statuses and bodies over the byte limit.
    pub async fn fetch_url(&self, locator: &str) -> Result<FetchResponse, Error> {
        let start = Instant::now();
        let url = self.resolve(locator)?;

        let mut response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, "image/avif,image/webp,image/*,*/*;q=0.8")
            .header(header::CACHE_CONTROL, CACHE_DIRECTIVE)
            .send()
            .await
            .map_err(|e| Error::NetworkFailure(format!("{url}: {e}")))?;

        let status = response.status();

        if !status.is_success() {
            return Err(Error::NetworkFailure(format!("{url}: status {}", status.as_u16())));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!(
                "{} bytes exceeds {}",
                len, self.config.max_bytes
            )));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::NetworkFailure(format!("failed to read response: {}", e)))?
        {
            if body.len() + chunk.len() > self.config.max_bytes {
                return Err(Error::FetchTooLarge(format!(
                    "body exceeds {} bytes",
                    self.config.max_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }
        let bytes = body.freeze();

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} -> {} in {}ms ({} bytes)",
            url,
            final_url,
            fetch_ms,
            bytes.len()
        );

        Ok(FetchResponse { url, final_url, status, content_type, bytes, fetch_ms })
    }

}

#[async_trait]
impl ImageSource for FetchClient {
    async fn fetch(&self, locator: &str) -> Result<FetchResponse, Error> {
        self.fetch_url(locator).await
    }
}
