//! Retailer page fetching.
//!
//! Each attempt opens its own [`PageSession`]: a fresh HTTP client with its own
//! cookie jar. The session navigates to the search page, waits until the page
//! is ready, and is released when it goes out of scope, whichever way the
//! attempt ends. Sessions are never shared between tasks or reused across
//! retries.
//!
//! Note: [`HttpPageFetcher`] sees only the HTML the server sends. Retailers
//! that build their result list with client-side script return a shell page,
//! which extraction then reports as a missing container. Scraping those needs
//! a browser-backed [`PageFetcher`] that waits for the locators to appear.

use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use url::Url;

use crate::config::ScraperConfig;

/// Errors that can occur while loading a page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page load timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("unexpected content type: {0}")]
    NotHtml(String),
    #[error("empty response body")]
    EmptyBody,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether another attempt could succeed.
    ///
    /// Connectivity problems, timeouts, `429` and `5xx` are transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connect(_) => true,
            Self::Status(status) => *status == 429 || (500..600).contains(status),
            Self::Http(err) => err.is_request() || err.is_body(),
            Self::NotHtml(_) | Self::EmptyBody | Self::InvalidUrl(_) => false,
        }
    }

    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}

/// Loads a retailer search page and returns its HTML.
pub trait PageFetcher: Send + Sync + 'static {
    /// Fetch `url`, returning the body once the page is ready.
    fn fetch_page(&self, url: &Url) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Production fetcher backed by `reqwest`.
///
/// Works for server-rendered result pages only; it does not run scripts.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    user_agent: String,
    page_timeout: Duration,
}

impl HttpPageFetcher {
    /// Create a fetcher with the given user agent and per-page timeout.
    #[must_use]
    pub fn new(user_agent: impl Into<String>, page_timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            page_timeout,
        }
    }

    /// Create a fetcher from scraper settings.
    #[must_use]
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(config.user_agent.clone(), config.page_timeout)
    }
}

impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError> {
        let session = PageSession::open(&self.user_agent, self.page_timeout)?;
        session.navigate(url).await
    }
}

/// A single-use browsing session.
///
/// Released on drop.
pub struct PageSession {
    client: reqwest::Client,
    timeout: Duration,
    opened_at: Instant,
}

impl PageSession {
    /// Open a session with its own connection pool and cookie jar.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the client cannot be built.
    pub fn open(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()?;

        tracing::trace!("Page session opened");
        Ok(Self {
            client,
            timeout,
            opened_at: Instant::now(),
        })
    }

    /// Navigate to `url` and wait until the page is ready.
    ///
    /// A page is ready when it answered with a success status, an HTML content
    /// type and a non-empty body, all within the session timeout. Content
    /// rendered later by script is not waited for.
    ///
    /// # Errors
    ///
    /// Returns a `FetchError` describing why the page never became ready.
    pub async fn navigate(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.contains("html") {
            return Err(FetchError::NotHtml(content_type));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody);
        }

        Ok(body)
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        tracing::trace!(
            elapsed_ms = u64::try_from(self.opened_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Page session released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_retry_classification() {
        assert!(FetchError::Status(503).is_retryable());
        assert!(FetchError::Status(429).is_retryable());
        assert!(!FetchError::Status(404).is_retryable());
        assert!(!FetchError::Status(403).is_retryable());
    }

    #[test]
    fn test_transport_failures_are_retryable() {
        assert!(FetchError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(FetchError::Connect("refused".to_string()).is_retryable());
    }

    #[test]
    fn test_page_content_failures_are_not_retryable() {
        assert!(!FetchError::EmptyBody.is_retryable());
        assert!(!FetchError::NotHtml("application/json".to_string()).is_retryable());
        assert!(!FetchError::InvalidUrl("nope".to_string()).is_retryable());
    }
}
