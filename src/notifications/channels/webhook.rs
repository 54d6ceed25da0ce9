//! Webhook notification channel
//!
//! This module provides a webhook channel for posting run digests via HTTP
//! POST requests.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Channel, ChannelError, ChannelResult, DeliveryStatus};
use crate::notifications::RunDigest;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Webhook channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL endpoint
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    pub auth_token: Option<String>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum delivery attempts, including the first one
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Delay before the second attempt in milliseconds; doubles afterwards
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    1000
}

impl WebhookConfig {
    /// Create a new webhook configuration
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            headers: std::collections::HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }

    /// Set authentication token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set max attempts
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial backoff delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_ms = delay.as_millis() as u64;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Webhook URL cannot be empty".to_string());
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err("Webhook URL must start with http:// or https://".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        if self.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }

        Ok(())
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(
            self.max_retries,
            Duration::from_millis(self.retry_base_ms),
            Duration::from_secs(30),
        )
    }
}

/// Webhook notification channel
///
/// Posts each run digest as a JSON payload. Server errors, throttling and
/// transport failures are retried with exponential backoff; other 4xx
/// responses fail immediately.
///
/// # Payload Format
///
/// ```json
/// {
///   "text": "Job Alert: 2 new jobs\n...",
///   "run_id": "5f0c...",
///   "trigger": "scheduled",
///   "mode": "live",
///   "new_jobs": 2,
///   "duplicates": 14,
///   "partial": false,
///   "jobs": [{ "title": "Rust Engineer", "score": 85, "url": "..." }],
///   "remaining": 0,
///   "sources": [{ "source": "remoteok", "successes": 3, "failures": 0 }]
/// }
/// ```
///
/// # Example
///
/// ```rust,ignore
/// use jobscout::notifications::{WebhookChannel, WebhookConfig};
///
/// let config = WebhookConfig::new("https://hooks.example.com/jobs")
///     .with_auth_token("secret-token")
///     .with_timeout(15);
///
/// let channel = WebhookChannel::new(config)?;
/// channel.send(&digest).await?;
/// ```
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    /// Create a new webhook channel
    pub fn new(config: WebhookConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Create a simple webhook channel with just a URL
    pub fn from_url(url: impl Into<String>) -> ChannelResult<Self> {
        Self::new(WebhookConfig::new(url))
    }

    /// Get the webhook URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Build the webhook payload from a digest
    fn build_payload(&self, digest: &RunDigest) -> ChannelResult<serde_json::Value> {
        let mut payload = serde_json::to_value(digest)?;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("text".into(), serde_json::Value::String(digest.render_text()));
        }
        Ok(payload)
    }

    /// One POST attempt
    async fn post_once(&self, payload: &serde_json::Value) -> ChannelResult<()> {
        let mut request = self.client.post(&self.config.url);

        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            tracing::info!(url = %self.config.url, status = %status, "Webhook delivered");
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());

        Err(match status.as_u16() {
            429 => ChannelError::RateLimited(body),
            s if status.is_server_error() => ChannelError::Unavailable(format!("HTTP {s}: {body}")),
            s => ChannelError::Rejected { status: s, body },
        })
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, digest: &RunDigest) -> ChannelResult<DeliveryStatus> {
        let payload = self.build_payload(digest)?;

        let mut attempts = 0;
        let result = with_retry_if(
            &self.config.retry_config(),
            || {
                attempts += 1;
                self.post_once(&payload)
            },
            ChannelError::is_retryable,
        )
        .await;

        match result {
            Ok(()) => Ok(DeliveryStatus::delivered(self.name(), digest.run_id, attempts)),
            Err(exhausted) => {
                tracing::error!(
                    url = %self.config.url,
                    run_id = %digest.run_id,
                    attempts = exhausted.attempts,
                    error = %exhausted.error,
                    "Failed to deliver webhook"
                );
                Ok(DeliveryStatus::failed(
                    self.name(),
                    digest.run_id,
                    exhausted.attempts,
                    exhausted.error.to_string(),
                ))
            }
        }
    }
}
