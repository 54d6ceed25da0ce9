//! jobscout - Job listing aggregation pipeline
//!
//! Periodically queries independent job boards, drops listings seen in
//! earlier runs, scores the rest for relevance and hands each run's new
//! jobs to notification and export collaborators.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Scraper contract, source registry, rate limiting, robots gate, fan-out
//! - [`storage`] - Fingerprints, the dedup store and its SQLite repository
//! - [`scoring`] - Relevance scorer
//! - [`pipeline`] - One complete run
//! - [`scheduler`] - Periodic single-flight driver
//! - [`notifications`] - Run digests and delivery channels
//! - [`export`] - Export of stored jobs
//! - [`models`] - Core data structures and types
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use jobscout::config::Config;
//! use jobscout::crawler::{Orchestrator, SourceRegistry};
//! use jobscout::pipeline::RunPipeline;
//! use jobscout::scheduler::Scheduler;
//! use jobscout::storage::{create_sqlite_repository, DedupStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let registry = SourceRegistry::builder().build_all();
//!     let store = DedupStore::new(create_sqlite_repository(&config.storage.database_path)?);
//!     let pipeline = RunPipeline::new(Orchestrator::new(registry), store, config.search.clone());
//!
//!     let scheduler = Scheduler::new(pipeline, config.scheduler.clone());
//!     let result = scheduler.run_once().await?;
//!     println!("{} new jobs", result.new_jobs.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod export;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod pipeline;
pub mod scheduler;
pub mod scoring;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{Orchestrator, Scraper, SearchPlan, SourceRegistry};
    pub use crate::error::{Error, ErrorCategory, Result, ScoutErrorTrait};
    pub use crate::models::{Job, RawListing, RunMode, RunResult, SourceOutcome, TriggerKind};
    pub use crate::pipeline::RunPipeline;
    pub use crate::scheduler::Scheduler;
    pub use crate::scoring::{RelevanceScorer, ScoringProfile};
    pub use crate::storage::{DedupStore, Fingerprint, JobRepository};
}

// Direct re-exports for convenience
pub use models::{Job, RawListing, RunResult};
