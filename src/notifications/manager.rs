//! Notification manager for digest fan-out

use std::sync::Arc;

use futures::future::join_all;

use super::channels::log::LogChannel;
use super::channels::webhook::WebhookChannel;
use super::channels::{Channel, ChannelResult, DeliveryStatus};
use super::{RunDigest, DEFAULT_DIGEST_LIMIT};
use crate::config::NotifyConfig;
use crate::metrics;
use crate::models::{Job, RunResult};

/// Outcome of delivering one digest to every channel
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub statuses: Vec<DeliveryStatus>,
}

impl DispatchReport {
    /// At least one channel accepted the digest
    pub fn any_success(&self) -> bool {
        self.statuses.iter().any(DeliveryStatus::is_delivered)
    }

    pub fn failures(&self) -> usize {
        self.statuses.iter().filter(|s| !s.is_delivered()).count()
    }
}

/// Notification manager that renders digests and fans them out
pub struct NotificationManager {
    /// Registered notification channels
    channels: Vec<Arc<dyn Channel>>,

    /// Jobs listed per digest
    digest_limit: usize,
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationManager {
    /// Create a manager with no channels
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            digest_limit: DEFAULT_DIGEST_LIMIT,
        }
    }

    /// Build channels from the `[notify]` config section
    pub fn from_config(config: &NotifyConfig) -> ChannelResult<Self> {
        let mut manager = Self::new().with_digest_limit(config.digest_limit);
        for url in &config.webhooks {
            manager.add_webhook_channel(url)?;
        }
        if config.log_digest {
            manager.add_channel(Arc::new(LogChannel));
        }
        Ok(manager)
    }

    /// Set how many jobs each digest lists
    pub fn with_digest_limit(mut self, limit: usize) -> Self {
        self.digest_limit = limit;
        self
    }

    /// Add a notification channel
    pub fn add_channel(&mut self, channel: Arc<dyn Channel>) {
        self.channels.push(channel);
    }

    /// Add a webhook channel with URL
    pub fn add_webhook_channel(&mut self, url: &str) -> ChannelResult<()> {
        let channel = WebhookChannel::from_url(url)?;
        self.add_channel(Arc::new(channel));
        Ok(())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Render the run and deliver it to all channels concurrently
    ///
    /// `backlog` holds jobs earlier runs failed to deliver. Channel errors
    /// are folded into failed statuses; one channel failing never prevents
    /// delivery through the others.
    pub async fn dispatch(&self, run: &RunResult, backlog: &[Job]) -> DispatchReport {
        let digest = RunDigest::with_backlog(run, backlog, self.digest_limit);
        self.deliver(&digest).await
    }

    /// Deliver an already rendered digest
    pub async fn deliver(&self, digest: &RunDigest) -> DispatchReport {
        let sends = self.channels.iter().map(|channel| async move {
            match channel.send(digest).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::error!(channel = channel.name(), error = %e, "Channel send failed");
                    DeliveryStatus::failed(channel.name(), digest.run_id, 1, e.to_string())
                }
            }
        });

        let statuses = join_all(sends).await;
        for status in &statuses {
            metrics::record_delivery(&status.channel, status.is_delivered());
        }

        tracing::info!(
            run_id = %digest.run_id,
            channels = statuses.len(),
            delivered = statuses.iter().filter(|s| s.is_delivered()).count(),
            "Digest dispatched"
        );

        DispatchReport { statuses }
    }
}
