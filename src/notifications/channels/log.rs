//! Channel that writes the digest to the log

use async_trait::async_trait;

use super::{Channel, ChannelResult, DeliveryStatus};
use crate::notifications::RunDigest;

/// Logs each digest at `info`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

#[async_trait]
impl Channel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, digest: &RunDigest) -> ChannelResult<DeliveryStatus> {
        tracing::info!(
            run_id = %digest.run_id,
            new_jobs = digest.new_jobs,
            "\n{}",
            digest.render_text()
        );
        Ok(DeliveryStatus::delivered("log", digest.run_id, 1))
    }
}
