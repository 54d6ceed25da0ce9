//! Error types for the jobscout pipeline
//!
//! This module defines the domain error types used by the scraper,
//! storage and scoring layers.

use thiserror::Error;

/// Errors a source can signal from a single `search` call
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Source signalled throttling (HTTP 429 or equivalent)
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Client error with status code (other than 429)
    #[error("Client error: {0}")]
    ClientError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Connection-level failure reported by a non-HTTP source
    #[error("Network error: {0}")]
    Network(String),

    /// Response could not be decoded into listings
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidUrl(_) | Self::ClientError(_))
    }

    /// Short machine-readable label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::RateLimit => "rate_limit",
            Self::ServerError(_) => "server_error",
            Self::ClientError(_) => "client_error",
            Self::Timeout => "timeout",
            Self::Network(_) => "network",
            Self::Parse(_) => "parse",
            Self::InvalidUrl(_) => "invalid_url",
        }
    }
}

/// Errors from the deduplication store
///
/// Any of these aborts the current run: without a working store the
/// "reported exactly once" guarantee cannot hold.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O failure while opening the database
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding the store lock
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// Blocking store task did not complete
    #[error("Store task failed: {0}")]
    Task(String),

    /// A persisted row could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Malformed input to the relevance scorer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    /// Listing has no usable title
    #[error("Listing has an empty title")]
    EmptyTitle,

    /// A keyword or tag carries a weight that cannot be applied
    #[error("Invalid weight {weight} for term '{term}'")]
    InvalidWeight { term: String, weight: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::RateLimit.is_retryable());
        assert!(FetchError::ServerError(503).is_retryable());
        assert!(FetchError::Parse("bad json".into()).is_retryable());

        assert!(!FetchError::ClientError(404).is_retryable());
        assert!(!FetchError::InvalidUrl("::".into()).is_retryable());
    }

    #[test]
    fn test_fetch_error_kind() {
        assert_eq!(FetchError::Timeout.kind(), "timeout");
        assert_eq!(FetchError::ServerError(500).kind(), "server_error");
    }

    #[test]
    fn test_scoring_error_display() {
        let err = ScoringError::InvalidWeight {
            term: "rust".into(),
            weight: -1.0,
        };
        assert!(err.to_string().contains("rust"));
    }
}
