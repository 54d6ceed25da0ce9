//! Delivery channels for run digests
//!
//! A channel receives one rendered [`RunDigest`] per run and reports a
//! [`DeliveryStatus`]. Transport errors either surface as `Err` or are
//! folded into a failed status once the channel gives up retrying; the
//! manager treats both the same way.

pub mod log;
pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::notifications::RunDigest;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Why a digest could not be delivered
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Receiver answered 5xx
    #[error("Receiver unavailable: {0}")]
    Unavailable(String),

    #[error("Receiver throttled delivery: {0}")]
    RateLimited(String),

    /// Receiver refused the payload (4xx other than 429)
    #[error("Rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Digest encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ChannelError {
    /// Whether resending could succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidConfig(_) | Self::Rejected { .. } | Self::Encode(_)
        )
    }
}

/// Final state of one digest on one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, reason: String },
}

/// What happened when a channel handled a run's digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryStatus {
    pub channel: String,
    pub run_id: Uuid,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
    pub finished_at: DateTime<Utc>,
}

impl DeliveryStatus {
    pub fn delivered(channel: impl Into<String>, run_id: Uuid, attempts: u32) -> Self {
        Self {
            channel: channel.into(),
            run_id,
            outcome: DeliveryOutcome::Delivered { attempts },
            finished_at: Utc::now(),
        }
    }

    pub fn failed(
        channel: impl Into<String>,
        run_id: Uuid,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            run_id,
            outcome: DeliveryOutcome::Failed {
                attempts,
                reason: reason.into(),
            },
            finished_at: Utc::now(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self.outcome {
            DeliveryOutcome::Delivered { attempts } | DeliveryOutcome::Failed { attempts, .. } => {
                attempts
            }
        }
    }

    /// Failure reason, if delivery failed
    pub fn reason(&self) -> Option<&str> {
        match &self.outcome {
            DeliveryOutcome::Delivered { .. } => None,
            DeliveryOutcome::Failed { reason, .. } => Some(reason),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            DeliveryOutcome::Delivered { attempts } => write!(
                f,
                "{}: run {} delivered after {attempts} attempt(s)",
                self.channel, self.run_id
            ),
            DeliveryOutcome::Failed { attempts, reason } => write!(
                f,
                "{}: run {} undelivered after {attempts} attempt(s): {reason}",
                self.channel, self.run_id
            ),
        }
    }
}

/// A transport that run digests can be delivered through
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one run's digest
    async fn send(&self, digest: &RunDigest) -> ChannelResult<DeliveryStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivered_status() {
        let run_id = Uuid::new_v4();
        let status = DeliveryStatus::delivered("webhook", run_id, 2);
        assert!(status.is_delivered());
        assert_eq!(status.attempts(), 2);
        assert!(status.reason().is_none());
        assert!(status.to_string().contains("delivered after 2"));
    }

    #[test]
    fn test_failed_status() {
        let status = DeliveryStatus::failed("log", Uuid::new_v4(), 3, "receiver gone");
        assert!(!status.is_delivered());
        assert_eq!(status.reason(), Some("receiver gone"));
        assert!(status.to_string().contains("undelivered"));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["attempts"], 3);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ChannelError::Unavailable("503".into()).is_retryable());
        assert!(ChannelError::RateLimited("429".into()).is_retryable());
        assert!(!ChannelError::InvalidConfig("no url".into()).is_retryable());
        assert!(!ChannelError::Rejected {
            status: 400,
            body: String::new()
        }
        .is_retryable());
    }
}
