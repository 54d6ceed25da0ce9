//! Delivery of run results
//!
//! The pipeline hands each live [`RunResult`] to the
//! [`NotificationManager`], which renders a [`RunDigest`] once and fans it
//! out to every registered channel concurrently. Jobs that earlier runs
//! failed to deliver ride along in the digest as carried over.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │      NotificationManager                   │
//! │  - Digest rendering (top N jobs)           │
//! │  - Concurrent channel fan-out              │
//! │  - Delivery report                         │
//! └────────────────────────────────────────────┘
//!                     │
//!             ┌───────┴───────┐
//!             ▼               ▼
//!       ┌─────────┐     ┌─────────┐
//!       │ Webhook │     │   Log   │
//!       │ Channel │     │ Channel │
//!       └─────────┘     └─────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use jobscout::notifications::NotificationManager;
//!
//! let mut manager = NotificationManager::new().with_digest_limit(10);
//! manager.add_webhook_channel("https://hooks.example.com/jobs")?;
//!
//! let report = manager.dispatch(&run_result, &backlog).await;
//! if report.any_success() { /* mark jobs notified */ }
//! ```

pub mod channels;
mod manager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

use crate::models::{Job, RunMode, RunResult, SourceOutcome, TriggerKind};

// Re-exports
pub use channels::log::LogChannel;
pub use channels::webhook::{WebhookChannel, WebhookConfig};
pub use channels::{Channel, ChannelError, ChannelResult, DeliveryStatus};
pub use manager::{DispatchReport, NotificationManager};

/// Default number of jobs listed in a digest
pub const DEFAULT_DIGEST_LIMIT: usize = 10;

/// One job line of a digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestEntry {
    pub title: String,
    pub company: String,
    pub location: String,
    pub url: String,
    pub source: String,
    pub score: u8,
    pub posted_at: Option<DateTime<Utc>>,

    /// Found by an earlier run whose delivery failed
    #[serde(default)]
    pub carried_over: bool,
}

impl DigestEntry {
    fn of(job: &Job, carried_over: bool) -> Self {
        Self {
            title: job.listing.title.clone(),
            company: job.listing.company.clone(),
            location: job.listing.location.clone(),
            url: job.listing.url.clone(),
            source: job.listing.source.clone(),
            score: job.score,
            posted_at: job.listing.posted_at,
            carried_over,
        }
    }
}

/// Channel-agnostic summary of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDigest {
    pub run_id: Uuid,
    pub trigger: TriggerKind,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub new_jobs: usize,
    pub duplicates: usize,
    pub partial: bool,

    /// Undelivered jobs of earlier runs included in this digest
    #[serde(default)]
    pub carried_over: usize,

    /// Highest-scoring jobs, at most `limit`
    pub jobs: Vec<DigestEntry>,

    /// Jobs not listed in `jobs`
    pub remaining: usize,

    pub sources: Vec<SourceOutcome>,
}

impl RunDigest {
    /// Summarize a run, listing the `limit` best-scoring new jobs
    pub fn from_run(run: &RunResult, limit: usize) -> Self {
        Self::with_backlog(run, &[], limit)
    }

    /// Summarize a run together with jobs earlier runs failed to deliver
    ///
    /// New and carried-over jobs are ranked together by score.
    pub fn with_backlog(run: &RunResult, backlog: &[Job], limit: usize) -> Self {
        let mut ranked: Vec<(&Job, bool)> = run
            .new_jobs
            .iter()
            .map(|job| (job, false))
            .chain(backlog.iter().map(|job| (job, true)))
            .collect();
        ranked.sort_by(|a, b| b.0.score.cmp(&a.0.score));

        let total = ranked.len();
        let jobs: Vec<DigestEntry> = ranked
            .into_iter()
            .take(limit)
            .map(|(job, carried)| DigestEntry::of(job, carried))
            .collect();

        Self {
            run_id: run.run_id,
            trigger: run.trigger,
            mode: run.mode,
            started_at: run.started_at,
            new_jobs: run.new_jobs.len(),
            duplicates: run.duplicates,
            partial: run.partial,
            carried_over: backlog.len(),
            remaining: total.saturating_sub(jobs.len()),
            jobs,
            sources: run.outcomes.clone(),
        }
    }

    /// Synthetic one-job digest for checking that channels are set up
    pub fn test_notice() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            trigger: TriggerKind::Manual,
            mode: RunMode::Live,
            started_at: now,
            new_jobs: 1,
            duplicates: 0,
            partial: false,
            carried_over: 0,
            jobs: vec![DigestEntry {
                title: "Test job: notifications are working".to_string(),
                company: "jobscout".to_string(),
                location: "Remote".to_string(),
                url: "https://example.com".to_string(),
                source: "test".to_string(),
                score: 100,
                posted_at: Some(now),
                carried_over: false,
            }],
            remaining: 0,
            sources: Vec::new(),
        }
    }

    /// Subject line
    pub fn headline(&self) -> String {
        let suffix = if self.partial { " (partial run)" } else { "" };
        let carried = match self.carried_over {
            0 => String::new(),
            n => format!(", {n} carried over"),
        };
        match self.new_jobs {
            1 => format!("Job Alert: 1 new job{carried}{suffix}"),
            n => format!("Job Alert: {n} new jobs{carried}{suffix}"),
        }
    }

    /// Plain-text rendering
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.headline());
        let _ = writeln!(out, "Generated: {}", self.started_at.format("%Y-%m-%d %H:%M UTC"));

        if self.jobs.is_empty() {
            let _ = writeln!(out, "\nNo new jobs found this run.");
        }

        for job in &self.jobs {
            let marker = if job.carried_over { " (carried over)" } else { "" };
            let _ = writeln!(out, "\n  [{:>3}/100] {}{marker}", job.score, job.title);
            let _ = writeln!(out, "  {} · {} ({})", job.company, job.location, job.source);
            if let Some(posted) = job.posted_at {
                let _ = writeln!(out, "  Posted: {}", posted.format("%Y-%m-%d"));
            }
            let _ = writeln!(out, "  Link: {}", job.url);
        }

        if self.remaining > 0 {
            let _ = writeln!(out, "\n...and {} more", self.remaining);
        }

        let _ = writeln!(out, "\nSources:");
        for s in &self.sources {
            let status = match s.skip {
                Some(reason) => format!("skipped ({reason})"),
                None if s.failures > 0 => format!("{} ok, {} failed", s.successes, s.failures),
                None => format!("{} ok", s.successes),
            };
            let _ = writeln!(out, "  {:<16} {:>4} listings  {}", s.source, s.listings, status);
        }

        out
    }
}
