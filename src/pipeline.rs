//! One run of the aggregation pipeline
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌────────────┐   ┌──────────┐
//! │   Term     │──▶│ Orchestrator │──▶│   Dedup    │──▶│  Scorer  │──▶ RunResult
//! │  snapshot  │   │  (fan-out)   │   │   store    │   │          │
//! └────────────┘   └──────────────┘   └────────────┘   └──────────┘
//! ```
//!
//! Scheduled and manual runs both go through [`RunPipeline::execute`]; the
//! only fatal failure is a store error, which still leaves a `failed`
//! entry in the run log.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::SearchConfig;
use crate::crawler::{Orchestrator, SearchPlan};
use crate::metrics;
use crate::models::{
    JobScore, RawListing, RunMode, RunRecord, RunResult, SearchTerm, TermKind, TriggerKind,
};
use crate::scoring::{RelevanceScorer, ScoringProfile};
use crate::storage::DedupStore;
use crate::utils::error::StoreResult;
use crate::utils::fold;

// ============================================================================
// Term Snapshot
// ============================================================================

/// Union of configured and stored terms
///
/// Terms are trimmed and deduplicated case-insensitively. The configured
/// entry wins on weight; order is configured terms first, then stored
/// terms in insertion order.
pub fn merge_terms(configured: &[SearchTerm], stored: &[SearchTerm]) -> Vec<SearchTerm> {
    let mut seen = HashSet::new();
    configured
        .iter()
        .chain(stored)
        .filter_map(|term| {
            let text = term.text.trim();
            if text.is_empty() || !seen.insert(fold(text)) {
                return None;
            }
            Some(SearchTerm {
                text: text.to_string(),
                weight: term.weight,
            })
        })
        .collect()
}

/// Terms and filters frozen for the duration of one run
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub plan: SearchPlan,
    pub profile: ScoringProfile,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Orchestrator, dedup store and scorer wired together
pub struct RunPipeline {
    orchestrator: Orchestrator,
    store: DedupStore,
    scorer: RelevanceScorer,
    search: SearchConfig,
    run_deadline: Option<Duration>,
}

impl RunPipeline {
    pub fn new(orchestrator: Orchestrator, store: DedupStore, search: SearchConfig) -> Self {
        Self {
            orchestrator,
            store,
            scorer: RelevanceScorer::new(),
            search,
            run_deadline: None,
        }
    }

    pub fn with_scorer(mut self, scorer: RelevanceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Bound the collection phase of each run
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.run_deadline = deadline;
        self
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Freeze the effective keywords, tags and filters
    pub async fn snapshot(&self) -> StoreResult<RunSnapshot> {
        let stored_keywords = self.store.terms(TermKind::Keyword).await?;
        let stored_tags = self.store.terms(TermKind::Tag).await?;

        let keywords = merge_terms(&self.search.keywords, &stored_keywords);
        let tags = merge_terms(&self.search.tags, &stored_tags);

        let plan = SearchPlan::new(
            keywords.iter().map(|k| k.text.clone()).collect(),
            self.search.locations.clone(),
        );
        let profile = ScoringProfile::new(keywords)
            .with_tags(tags)
            .with_locations(self.search.locations.clone())
            .with_remote_filter(self.search.remote_filter)
            .with_experience_level(self.search.experience_level);

        Ok(RunSnapshot { plan, profile })
    }

    /// Execute one run
    ///
    /// Source failures never fail the run; they are reported in the
    /// per-source outcomes. A store error aborts the run.
    pub async fn execute(
        &self,
        run_id: Uuid,
        trigger: TriggerKind,
        mode: RunMode,
    ) -> StoreResult<RunResult> {
        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        tracing::info!(
            run_id = %run_id,
            trigger = trigger.as_str(),
            mode = mode.as_str(),
            "Run started"
        );

        let outcome = self.run_stages(run_id, trigger, mode, started_at).await;
        let elapsed = clock.elapsed().as_secs_f64();

        match outcome {
            Ok(result) => {
                let status = if result.partial { "partial" } else { "ok" };
                self.store
                    .record_run(run_record(&result, status))
                    .await?;
                metrics::record_run(trigger.as_str(), status, elapsed);

                tracing::info!(
                    run_id = %run_id,
                    status,
                    new_jobs = result.new_jobs.len(),
                    duplicates = result.duplicates,
                    failures = result.total_failures(),
                    skipped_sources = result.skipped_sources(),
                    duration_ms = result.duration_ms(),
                    "Run completed"
                );
                Ok(result)
            }
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "Run aborted by store failure");
                metrics::record_run(trigger.as_str(), "failed", elapsed);

                let record = RunRecord {
                    run_id: run_id.to_string(),
                    trigger: trigger.as_str().to_string(),
                    mode: mode.as_str().to_string(),
                    started_at,
                    finished_at: Utc::now(),
                    new_jobs: 0,
                    duplicates: 0,
                    status: "failed".to_string(),
                };
                if let Err(log_err) = self.store.record_run(record).await {
                    tracing::warn!(run_id = %run_id, error = %log_err, "Failed to log failed run");
                }
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        run_id: Uuid,
        trigger: TriggerKind,
        mode: RunMode,
        started_at: DateTime<Utc>,
    ) -> StoreResult<RunResult> {
        let RunSnapshot { plan, profile } = self.snapshot().await?;
        if plan.keywords.is_empty() {
            tracing::warn!(run_id = %run_id, "No keywords configured; no source will be queried");
        }

        let deadline = self.run_deadline.map(|d| Instant::now() + d);
        let harvest = self.orchestrator.collect(&plan, deadline).await;

        let scorer = self.scorer.clone();
        let admission = self
            .store
            .admit(harvest.listings, Utc::now(), move |listing| {
                score_listing(&scorer, listing, &profile)
            })
            .await?;
        metrics::record_dedup_results(admission.new_jobs.len(), admission.duplicates);
        tracing::info!(
            run_id = %run_id,
            new_jobs = admission.new_jobs.len(),
            duplicates = admission.duplicates,
            flagged = admission.new_jobs.iter().filter(|j| j.score_flagged).count(),
            "Deduplicated and scored listings"
        );

        Ok(RunResult {
            run_id,
            trigger,
            mode,
            started_at,
            finished_at: Utc::now(),
            new_jobs: admission.new_jobs,
            duplicates: admission.duplicates,
            outcomes: harvest.outcomes,
            partial: harvest.timed_out,
        })
    }
}

/// Score a newly admitted listing
///
/// A listing the scorer rejects is stored with score 0 and flagged.
fn score_listing(
    scorer: &RelevanceScorer,
    listing: &RawListing,
    profile: &ScoringProfile,
) -> JobScore {
    match scorer.score(listing, profile) {
        Ok(score) => JobScore {
            score,
            flagged: false,
        },
        Err(e) => {
            tracing::warn!(
                fingerprint = listing.fingerprint().short(),
                url = %listing.url,
                error = %e,
                "Scoring failed, storing with score 0"
            );
            JobScore::FLAGGED
        }
    }
}

fn run_record(result: &RunResult, status: &str) -> RunRecord {
    RunRecord {
        run_id: result.run_id.to_string(),
        trigger: result.trigger.as_str().to_string(),
        mode: result.mode.as_str().to_string(),
        started_at: result.started_at,
        finished_at: result.finished_at,
        new_jobs: result.new_jobs.len(),
        duplicates: result.duplicates,
        status: status.to_string(),
    }
}
