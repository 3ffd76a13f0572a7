//! Page fetching
//!
//! [`Fetcher`] is the only collaborator that talks to arbitrary hosts. The
//! default [`HttpFetcher`] sleeps for the configured pacing delay before every
//! request, so concurrent workers never hammer a directory site faster than
//! `max_concurrency / request_delay` requests per second.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::FetchConfig;
use crate::error::{Error, FetchError, Result};

/// Retrieves the raw content of one URL
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the page body
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`]; callers decide on retries through
    /// [`IsRetryable`](crate::retry::IsRetryable).
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError>;
}

/// Parse and check that a URL is absolute http(s)
pub fn parse_page_url(url: &str) -> std::result::Result<url::Url, FetchError> {
    let parsed = url::Url::parse(url.trim()).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// reqwest-backed fetcher with a pacing delay
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    request_delay: Duration,
    timeout: Duration,
}

impl HttpFetcher {
    /// Build a fetcher from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            client,
            request_delay: config.request_delay,
            timeout: config.timeout,
        })
    }

    /// Pacing delay applied before each request
    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }

    fn classify(&self, url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else if e.is_connect() || e.is_request() {
            FetchError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        let parsed = parse_page_url(url)?;

        if !self.request_delay.is_zero() {
            tracing::debug!(
                url = %url,
                delay_ms = self.request_delay.as_millis() as u64,
                "Pacing before request"
            );
            tokio::time::sleep(self.request_delay).await;
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Body(e.to_string())
            }
        })?;

        tracing::debug!(url = %url, bytes = body.len(), "Fetched page");
        Ok(body)
    }
}
