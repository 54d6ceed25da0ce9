use anyhow::{bail, Context, Result};

use jobscout::config::Config;
use jobscout::notifications::{NotificationManager, RunDigest};

/// Send a synthetic digest through every configured channel
pub async fn test_notify(config: &Config) -> Result<()> {
    let manager = NotificationManager::from_config(&config.notify)
        .context("Invalid notification configuration")?;
    if manager.is_empty() {
        bail!("No notification channels configured (set notify.webhooks or notify.log_digest)");
    }

    let digest = RunDigest::test_notice();
    tracing::info!(
        run_id = %digest.run_id,
        channels = manager.channel_count(),
        "Sending test notification"
    );
    let report = manager.deliver(&digest).await;

    println!("Test notification ({} channel(s))", report.statuses.len());
    println!("========================================");
    for status in &report.statuses {
        let mark = if status.is_delivered() { "ok  " } else { "FAIL" };
        println!("  [{mark}] {status}");
    }

    if !report.any_success() {
        bail!("No channel accepted the test notification");
    }
    Ok(())
}
