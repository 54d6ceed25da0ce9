use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobscout::config::Config;
use jobscout::models::{RunMode, TermKind};

mod commands;

#[derive(Parser)]
#[command(
    name = "jobscout",
    version,
    about = "Scheduled job-listing aggregator with deduplication and relevance scoring",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides logging.format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted
    Run,

    /// Execute one live run and dispatch its digest
    Once,

    /// Execute one run without dispatching (persist and score only)
    DryRun,

    /// List jobs not yet delivered, newest first
    ListUnseen {
        /// Maximum number of jobs to list
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Export undelivered jobs as JSON lines
    ExportUnseen {
        /// Maximum number of jobs to export (all when omitted)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage stored keywords
    Keyword {
        #[command(subcommand)]
        action: TermAction,
    },

    /// Manage stored tags
    Tag {
        #[command(subcommand)]
        action: TermAction,
    },

    /// Print the effective configuration
    ShowConfig,

    /// Show recent runs
    History {
        /// Number of runs to show
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Send a test notification through every configured channel
    TestNotify,

    /// Run one search per source and report listings, errors and latency
    Diagnose {
        /// Check only this source
        #[arg(short, long)]
        source: Option<String>,

        /// Keyword to search (first configured keyword by default)
        #[arg(short, long)]
        keyword: Option<String>,

        /// Location to search (first configured location by default)
        #[arg(short, long)]
        location: Option<String>,
    },
}

#[derive(Subcommand)]
enum TermAction {
    /// Add a term (updates the weight if it exists)
    Add {
        text: String,

        /// Scoring weight (default 1.0)
        #[arg(short, long)]
        weight: Option<f64>,
    },

    /// Remove a term
    Remove { text: String },

    /// List stored terms
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    // Initialize tracing/logging
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = jobscout::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    match cli.command {
        Commands::Run => {
            tracing::info!(
                interval_hours = config.scheduler.interval_hours,
                "Starting run command"
            );
            commands::run::run_scheduler(config).await?;
        }

        Commands::Once => {
            commands::run::run_single(config, RunMode::Live).await?;
        }

        Commands::DryRun => {
            commands::run::run_single(config, RunMode::Dry).await?;
        }

        Commands::ListUnseen { limit } => {
            commands::jobs::list_unseen(&config, limit)?;
        }

        Commands::ExportUnseen { limit, output } => {
            tracing::info!(limit = ?limit, output = ?output, "Starting export command");
            commands::jobs::export_unseen(&config, limit, output)?;
        }

        Commands::Keyword { action } => {
            run_term_action(&config, TermKind::Keyword, action)?;
        }

        Commands::Tag { action } => {
            run_term_action(&config, TermKind::Tag, action)?;
        }

        Commands::ShowConfig => {
            commands::show_config(&config)?;
        }

        Commands::History { limit } => {
            commands::jobs::history(&config, limit)?;
        }

        Commands::TestNotify => {
            commands::notify::test_notify(&config).await?;
        }

        Commands::Diagnose {
            source,
            keyword,
            location,
        } => {
            tracing::info!(source = ?source, "Starting diagnose command");
            commands::diagnose::diagnose(&config, source, keyword, location).await?;
        }
    }

    Ok(())
}

fn run_term_action(config: &Config, kind: TermKind, action: TermAction) -> Result<()> {
    match action {
        TermAction::Add { text, weight } => commands::terms::add(config, kind, &text, weight),
        TermAction::Remove { text } => commands::terms::remove(config, kind, &text),
        TermAction::List => commands::terms::list(config, kind),
    }
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("jobscout=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!("jobscout={level},warn"))
            })
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
