//! Shared HTTP fetcher for HTTP-backed sources
//!
//! Provides:
//! - User-Agent rotation (or a fixed configured agent)
//! - Status code → [`FetchError`] mapping used by the retry policy
//! - JSON and text decoding
//!
//! Pacing and retry live in [`super::limiter`]; a fetcher performs exactly
//! one request per call.

use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT},
    Client, Response, StatusCode,
};
use serde::de::DeserializeOwned;

use crate::utils::error::FetchError;

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Single-request HTTP client shared by sources
#[derive(Clone)]
pub struct HttpFetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Fixed User-Agent; rotates through [`USER_AGENTS`] when `None`
    user_agent: Option<String>,

    /// Optional base URL override for testing with mock servers
    base_url: Option<String>,
}

impl HttpFetcher {
    /// Create a fetcher with the given request timeout
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            user_agent: None,
            base_url: None,
        })
    }

    /// Use a fixed User-Agent instead of rotating
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        let ua = user_agent.into();
        self.user_agent = if ua.trim().is_empty() { None } else { Some(ua) };
        self
    }

    /// Prefix relative request paths with `base_url`
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Underlying reqwest client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// User-Agent for the next request
    pub fn user_agent(&self) -> &str {
        match &self.user_agent {
            Some(ua) => ua,
            None => random_user_agent(),
        }
    }

    /// Issue a GET and map non-success statuses to errors
    pub async fn get(&self, url: &str) -> Result<Response, FetchError> {
        let full_url = match &self.base_url {
            Some(base) if !url.starts_with("http://") && !url.starts_with("https://") => {
                format!("{base}{url}")
            }
            _ => url.to_string(),
        };
        reqwest::Url::parse(&full_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{full_url}: {e}")))?;

        tracing::debug!(url = %full_url, "Fetching");

        let response = self
            .client
            .get(&full_url)
            .headers(self.build_headers())
            .send()
            .await
            .map_err(map_transport_error)?;

        match status_error(response.status()) {
            Some(err) => Err(err),
            None => Ok(response),
        }
    }

    /// GET and return the body as text
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url).await?;
        response.text().await.map_err(map_transport_error)
    }

    /// GET and decode the body as JSON
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Parse(e.to_string()))
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(ua) = HeaderValue::from_str(self.user_agent()) {
            headers.insert(USER_AGENT, ua);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json,text/html;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        headers
    }
}

/// Map an HTTP status to the error a source should report, if any
///
/// - 429 → `RateLimit` (retried with backoff)
/// - 5xx → `ServerError` (retried)
/// - other 4xx → `ClientError` (not retried)
pub fn status_error(status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Some(FetchError::RateLimit)
    } else if status.is_server_error() {
        Some(FetchError::ServerError(status.as_u16()))
    } else if status.is_client_error() {
        Some(FetchError::ClientError(status.as_u16()))
    } else {
        Some(FetchError::ServerError(status.as_u16()))
    }
}

fn map_transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Network(e.to_string())
    } else if e.is_decode() || e.is_body() {
        FetchError::Parse(e.to_string())
    } else {
        FetchError::Http(e)
    }
}

/// Get a random user agent from the pool
fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0])
}
