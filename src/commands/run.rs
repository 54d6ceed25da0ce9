use anyhow::{Context, Result};

use jobscout::config::Config;
use jobscout::models::{RunMode, RunResult};

use super::build_scheduler;

/// Run the interval loop until Ctrl-C
pub async fn run_scheduler(config: Config) -> Result<()> {
    let scheduler = build_scheduler(&config)?;

    println!("jobscout scheduler");
    println!("==================");
    let sources = scheduler.pipeline().orchestrator().registry().names();
    println!("  Sources: {}", sources.join(", "));
    println!("  Interval: {}h", config.scheduler.interval_hours);
    println!("  Run on start: {}", config.scheduler.run_on_start);
    println!("Press Ctrl-C to stop.");

    let handle = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.start().await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");
    scheduler.stop();

    handle
        .await
        .context("Scheduler task panicked")?
        .context("Scheduler stopped with an error")?;
    Ok(())
}

/// Execute one run and print its summary
pub async fn run_single(config: Config, mode: RunMode) -> Result<()> {
    let scheduler = build_scheduler(&config)?;

    let result = match mode {
        RunMode::Live => scheduler.run_once().await,
        RunMode::Dry => scheduler.dry_run().await,
    }
    .context("Run failed")?;

    print_summary(&result);

    match jobscout::metrics::encode_metrics() {
        Ok(text) if !text.is_empty() => tracing::debug!("Metrics after run:\n{text}"),
        Ok(_) => {}
        Err(e) => tracing::debug!(error = %e, "Failed to encode metrics"),
    }
    Ok(())
}

fn print_summary(result: &RunResult) {
    println!();
    println!("Run {} ({})", result.run_id, result.mode.as_str());
    println!("========================================");
    println!("  New jobs:    {}", result.new_jobs.len());
    println!("  Duplicates:  {}", result.duplicates);
    println!("  Duration:    {} ms", result.duration_ms());
    if result.partial {
        println!("  Deadline hit: results are partial");
    }

    println!();
    println!("  {:<16} {:>8} {:>8} {:>9}  status", "source", "ok", "failed", "listings");
    for o in &result.outcomes {
        let status = match (o.skip, &o.last_error) {
            (Some(reason), _) => format!("skipped: {reason}"),
            (None, Some(err)) => format!("last error: {err}"),
            (None, None) => "ok".to_string(),
        };
        println!(
            "  {:<16} {:>8} {:>8} {:>9}  {}",
            o.source, o.successes, o.failures, o.listings, status
        );
    }

    if !result.new_jobs.is_empty() {
        println!();
        let mut jobs: Vec<_> = result.new_jobs.iter().collect();
        jobs.sort_by(|a, b| b.score.cmp(&a.score));
        for job in jobs {
            let flag = if job.score_flagged { " (unscored)" } else { "" };
            println!(
                "  [{:>3}] {} @ {}{}",
                job.score, job.listing.title, job.listing.company, flag
            );
            println!("        {}", job.listing.url);
        }
    }
}
