//! HTTP network layer.
//!
//! ### URL Resolution
//! - Relative resource paths resolve against the site origin
//! - Only http(s) URLs are fetched; fragments are dropped
//!
//! ### Limits
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//!
//! Non-2xx responses are returned, not raised: whether to persist them is
//! the caller's decision. Only transport failures surface as errors.

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use reqwest::{Client, Method, StatusCode, header};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub use self::url::{UrlError, resolve};

use pocketsw_core::{AppConfig, Error, Snapshot};

/// Source of network responses for the dispatcher and worker.
#[async_trait]
pub trait Network: Send + Sync {
    /// Issue `method` against `url`.
    ///
    /// # Errors
    ///
    /// Returns an error only when no response could be obtained.
    async fn send(&self, method: Method, url: &Url) -> Result<Snapshot, Error>;

    /// Fetch `url` with GET.
    async fn fetch(&self, url: &Url) -> Result<Snapshot, Error> {
        self.send(Method::GET, url).await
    }
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "pocketsw/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "pocketsw/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL requested
    pub url: Url,
    /// The final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Response body bytes
    pub bytes: Bytes,
    /// Response headers
    pub headers: header::HeaderMap,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl FetchResponse {
    /// Convert into a cacheable snapshot keyed by the requested URL.
    ///
    /// Repeated header values are joined with `", "`.
    pub fn into_snapshot(self) -> Snapshot {
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in self.headers.iter() {
            let Ok(value) = value.to_str() else { continue };
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        Snapshot {
            url: self.url.to_string(),
            status: self.status.as_u16(),
            headers,
            body: self.bytes.to_vec(),
            cached_at: None,
        }
    }
}

/// HTTP fetch client backed by reqwest.
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
            .map_err(|e| Error::FetchTimeout(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Send a request, returning raw bytes and metadata for any status.
    pub async fn request(&self, method: Method, url: &Url) -> Result<FetchResponse, Error> {
        let start = Instant::now();

        let response = self.http.request(method, url.as_str()).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::FetchTimeout(format!("{url}: {e}"))
            } else {
                Error::HttpError(format!("network error: {e}"))
            }
        })?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!(
                "{} bytes exceeds {}",
                len, self.config.max_bytes
            )));
        }

        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::HttpError(format!("failed to read response: {}", e)))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!(
                "{} bytes exceeds {}",
                bytes.len(),
                self.config.max_bytes
            )));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} -> {} ({}) in {}ms ({} bytes)",
            url,
            final_url,
            status.as_u16(),
            fetch_ms,
            bytes.len()
        );

        Ok(FetchResponse { url: url.clone(), final_url, status, bytes, headers, fetch_ms })
    }
}

#[async_trait]
impl Network for FetchClient {
    async fn send(&self, method: Method, url: &Url) -> Result<Snapshot, Error> {
        Ok(self.request(method, url).await?.into_snapshot())
    }
}
