//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests made during link discovery and
//! document extraction:
//! - Building HTTP clients with a proper user agent string
//! - The `PageFetcher` capability and its reqwest implementation
//! - Content-Type checks that keep non-HTML responses out of discovery
//! - Error classification into transient and permanent failures

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors produced by a single fetch attempt
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("could not connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Other { url: String, message: String },
}

impl FetchError {
    /// Classifies a reqwest error for the given URL
    pub fn from_reqwest(url: &Url, error: reqwest::Error) -> Self {
        let url = url.to_string();
        if error.is_timeout() {
            FetchError::Timeout { url }
        } else if error.is_connect() {
            FetchError::Connect {
                url,
                message: error.to_string(),
            }
        } else {
            FetchError::Other {
                url,
                message: error.to_string(),
            }
        }
    }

    /// Returns true if another attempt may succeed
    ///
    /// | Condition | Transient |
    /// |-----------|-----------|
    /// | Timeout | yes |
    /// | Connection failure | yes |
    /// | HTTP 429 | yes |
    /// | HTTP 5xx | yes |
    /// | Other HTTP status | no |
    /// | Body/protocol error | yes |
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Connect { .. } | FetchError::Other { .. } => {
                true
            }
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// A complete HTTP response as seen by the crawler
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: u16,
    /// Content-Type header value (empty when absent)
    pub content_type: String,
    /// Response body
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP GET capability shared by discovery, robots.txt and document fetching
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Performs one GET request, following redirects
    async fn get(&self, url: &Url) -> Result<RawResponse, FetchError>;
}

/// Result of fetching a page that may contain links
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// Successfully fetched an HTML page
    Success {
        /// Final URL after redirects
        final_url: Url,
        /// Content-Type header value
        content_type: String,
        /// Page body decoded as UTF-8 (lossy)
        body: String,
    },

    /// Page is not HTML (Content-Type mismatch)
    ContentMismatch {
        /// The actual Content-Type received
        content_type: String,
    },
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The User-Agent header value
/// * `timeout` - Total timeout for each request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use sumi_glean::config::UserAgentConfig;
/// use sumi_glean::crawler::build_http_client;
///
/// let user_agent = UserAgentConfig::default().header_value();
/// let client = build_http_client(&user_agent, Duration::from_secs(10)).unwrap();
/// ```
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `PageFetcher` backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent, timeout)?,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn get(&self, url: &Url) -> Result<RawResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        // Error bodies are never inspected
        let body = if response.status().is_success() {
            response
                .bytes()
                .await
                .map_err(|e| FetchError::from_reqwest(url, e))?
                .to_vec()
        } else {
            Vec::new()
        };

        Ok(RawResponse {
            final_url,
            status,
            content_type,
            body,
        })
    }
}

/// Returns true if a Content-Type header denotes an HTML document
pub fn is_html_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}

/// Fetches a page for link discovery
///
/// Non-2xx responses become `FetchError::Status`; 2xx responses that are not
/// HTML become `FetchResult::ContentMismatch`.
pub async fn fetch_html(fetcher: &dyn PageFetcher, url: &Url) -> Result<FetchResult, FetchError> {
    let response = fetcher.get(url).await?;

    if !response.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status,
        });
    }

    if !is_html_content_type(&response.content_type) {
        return Ok(FetchResult::ContentMismatch {
            content_type: response.content_type,
        });
    }

    Ok(FetchResult::Success {
        final_url: response.final_url,
        content_type: response.content_type,
        body: String::from_utf8_lossy(&response.body).into_owned(),
    })
}

/// Fetches raw bytes (robots.txt, documents), failing on non-2xx statuses
pub async fn fetch_raw(fetcher: &dyn PageFetcher, url: &Url) -> Result<Vec<u8>, FetchError> {
    let response = fetcher.get(url).await?;

    if !response.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status,
        });
    }

    Ok(response.body)
}
