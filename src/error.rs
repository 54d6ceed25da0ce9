//! Unified error handling for the jobscout crate
//!
//! Each layer keeps its own error enum (`FetchError` for sources,
//! `StoreError` for the dedup store, `ChannelError` for delivery, ...).
//! [`Error`] wraps them so the scheduler loop and the CLI can classify a
//! failure without matching on every layer.
//!
//! # Architecture
//!
//! - [`ScoutErrorTrait`] - Common interface implemented by the unified error
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use jobscout::error::{Error, ScoutErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = ?err.category(), "Will retry next run: {err}");
//!     } else {
//!         eprintln!("Fatal error: {}", err);
//!     }
//! }
//! ```

use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::export::ExportError;
pub use crate::notifications::ChannelError;
pub use crate::scheduler::error::SchedulerError;
pub use crate::utils::error::{FetchError, ScoringError, StoreError};

/// Common trait for jobscout error types
pub trait ScoutErrorTrait: std::error::Error {
    /// Check if this error is recoverable (a later attempt may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Source fetches (HTTP, timeout, rate limit)
    Network,
    /// Dedup store and other persistence
    Storage,
    /// Relevance scoring input
    Scoring,
    /// Notification and export
    Delivery,
    /// Configuration and validation errors
    Config,
    /// Scheduler and single-flight errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Scoring => "scoring",
            Self::Delivery => "delivery",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the jobscout crate
#[derive(Error, Debug)]
pub enum Error {
    /// Source fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Dedup store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Scoring input errors
    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    /// Notification channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Export errors
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Rejected configuration value
    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl ScoutErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_retryable(),
            Self::Store(_) => false,
            Self::Scoring(_) => false,
            Self::Channel(e) => e.is_retryable(),
            Self::Export(_) => true,
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Config(_) | Self::Other(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(_) => ErrorCategory::Network,
            Self::Store(_) => ErrorCategory::Storage,
            Self::Scoring(_) => ErrorCategory::Scoring,
            Self::Channel(_) | Self::Export(_) => ErrorCategory::Delivery,
            Self::Scheduler(SchedulerError::RunFailed { .. }) => ErrorCategory::Storage,
            Self::Scheduler(SchedulerError::InvalidConfig { .. }) => ErrorCategory::Config,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other(_) => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn other(context: impl Into<String>) -> Self {
        Self::Other(context.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
