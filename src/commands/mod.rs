pub mod diagnose;
pub mod jobs;
pub mod notify;
pub mod run;
pub mod terms;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use jobscout::config::Config;
use jobscout::crawler::{
    AllowAll, HttpFetcher, HttpRobotsPolicy, JsonFeedScraper, Orchestrator, SharedRobotsPolicy,
    SourceRegistry,
};
use jobscout::export::JsonLinesExporter;
use jobscout::notifications::NotificationManager;
use jobscout::pipeline::RunPipeline;
use jobscout::scheduler::Scheduler;
use jobscout::storage::{create_sqlite_repository, DedupStore, SharedJobRepository};

/// Open the SQLite job store named in the config
pub fn open_repository(config: &Config) -> Result<SharedJobRepository> {
    create_sqlite_repository(&config.storage.database_path).with_context(|| {
        format!(
            "Failed to open job database: {}",
            config.storage.database_path.display()
        )
    })
}

/// Build the registry from the configured feed sources, enabling `enabled`
pub fn build_registry<S: AsRef<str>>(
    config: &Config,
    fetcher: &HttpFetcher,
    enabled: &[S],
) -> SourceRegistry {
    let builder = config
        .scraper
        .feeds
        .iter()
        .fold(SourceRegistry::builder(), |builder, feed| {
            builder.register(Arc::new(JsonFeedScraper::new(feed.clone(), fetcher.clone())))
        });

    builder.build(enabled)
}

/// Fetcher, registry, robots gate and limiters for the given sources
pub fn build_orchestrator<S: AsRef<str>>(config: &Config, enabled: &[S]) -> Result<Orchestrator> {
    let fetcher = HttpFetcher::new(config.scraper.request_timeout())
        .context("Failed to create HTTP client")?
        .with_user_agent(config.scraper.user_agent.clone());

    let registry = build_registry(config, &fetcher, enabled);
    if registry.is_empty() {
        tracing::warn!("No sources enabled; runs will find nothing");
    }

    let robots: SharedRobotsPolicy = if config.scraper.respect_robots {
        Arc::new(HttpRobotsPolicy::new(
            fetcher.clone(),
            Duration::from_secs(config.scraper.robots_cache_secs),
        ))
    } else {
        Arc::new(AllowAll)
    };

    Ok(Orchestrator::from_config(registry, robots, &config.scraper))
}

/// Wire registry, store, notifier and exporter into a scheduler
pub fn build_scheduler(config: &Config) -> Result<Scheduler> {
    let orchestrator = build_orchestrator(config, &config.scraper.enabled())?;
    let store = DedupStore::new(open_repository(config)?);
    let pipeline = RunPipeline::new(orchestrator, store, config.search.clone())
        .with_deadline(config.scheduler.run_deadline());

    let notifier = NotificationManager::from_config(&config.notify)
        .context("Invalid notification configuration")?;

    let mut builder =
        Scheduler::builder(pipeline, config.scheduler.clone()).with_notifier(notifier);
    if let Some(path) = &config.notify.export_path {
        builder = builder.with_exporter(Arc::new(JsonLinesExporter::new(path)));
    }

    Ok(builder.build())
}

pub fn show_config(config: &Config) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render config")?;
    println!("{rendered}");
    Ok(())
}
