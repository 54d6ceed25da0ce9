//! Error scenario integration tests
//!
//! Tests various failure modes and error handling:
//! 1. Store failures abort the run but still leave a run-log entry
//! 2. Scoring failures flag the job instead of dropping it
//! 3. Throttled sources recover through backoff
//! 4. Every source failing still completes the run

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use jobscout::crawler::Scraper;
use jobscout::models::{RawListing, RunMode, SearchTerm, TermKind, TriggerKind};
use jobscout::storage::{create_mock_repository, JobRepository};
use jobscout::utils::error::{FetchError, StoreError};

use crate::common::{
    as_source, listing, pipeline, search_config, BrokenJobTable, FailingScraper, StubScraper,
};

// ============================================================================
// Store Failures
// ============================================================================

#[tokio::test]
async fn test_store_failure_fails_run_and_is_logged() {
    let repo = Arc::new(BrokenJobTable::new());
    let stub = StubScraper::with_jobs("board", 2).shared();
    let pipeline = pipeline(
        vec![as_source(&stub)],
        repo.clone(),
        search_config(&["Engineer"]),
        3,
    );

    let run_id = Uuid::new_v4();
    let result = pipeline
        .execute(run_id, TriggerKind::Manual, RunMode::Live)
        .await;

    assert!(matches!(result, Err(StoreError::Corrupt(_))));

    let runs = repo.recent_runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, run_id.to_string());
    assert_eq!(runs[0].status, "failed");
    assert_eq!(runs[0].new_jobs, 0);
}

// ============================================================================
// Scoring Failures
// ============================================================================

#[tokio::test]
async fn test_untitled_listing_stored_with_flag() {
    let repo = create_mock_repository();
    let stub = StubScraper::new(
        "board",
        vec![
            listing("board", "", "https://board.test/jobs/untitled"),
            listing("board", "Rust Engineer", "https://board.test/jobs/1"),
        ],
    )
    .shared();
    let pipeline = pipeline(vec![as_source(&stub)], repo.clone(), search_config(&["Rust"]), 3);

    let result = pipeline
        .execute(Uuid::new_v4(), TriggerKind::Manual, RunMode::Dry)
        .await
        .unwrap();

    assert_eq!(result.new_jobs.len(), 2);
    let untitled = &result.new_jobs[0];
    assert_eq!(untitled.score, 0);
    assert!(untitled.score_flagged);
    assert!(!result.new_jobs[1].score_flagged);
    assert!(result.new_jobs[1].score > 0);

    let stored = repo.get(&untitled.fingerprint).unwrap().unwrap();
    assert!(stored.score_flagged);
}

#[tokio::test]
async fn test_invalid_stored_weight_flags_every_job() {
    let repo = create_mock_repository();
    repo.add_term(TermKind::Tag, &SearchTerm::weighted("python", -1.0))
        .unwrap();
    let stub = StubScraper::with_jobs("board", 3).shared();
    let pipeline = pipeline(vec![as_source(&stub)], repo, search_config(&["Engineer"]), 3);

    let result = pipeline
        .execute(Uuid::new_v4(), TriggerKind::Manual, RunMode::Dry)
        .await
        .unwrap();

    assert_eq!(result.new_jobs.len(), 3);
    assert!(result.new_jobs.iter().all(|j| j.score_flagged && j.score == 0));
}

// ============================================================================
// Source Failures
// ============================================================================

/// Throttles the first `throttled` calls, then answers
struct ThrottledScraper {
    throttled: u32,
    calls: AtomicU32,
}

#[async_trait]
impl Scraper for ThrottledScraper {
    fn name(&self) -> &str {
        "throttled"
    }

    async fn search(&self, _keyword: &str, _location: &str) -> Result<Vec<RawListing>, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.throttled {
            return Err(FetchError::RateLimit);
        }
        Ok(vec![listing("throttled", "Backend Engineer", "https://throttled.test/1")])
    }
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_source_recovers() {
    let scraper = Arc::new(ThrottledScraper {
        throttled: 2,
        calls: AtomicU32::new(0),
    });
    let pipeline = pipeline(
        vec![as_source(&scraper)],
        create_mock_repository(),
        search_config(&["Engineer"]),
        3,
    );

    let result = pipeline
        .execute(Uuid::new_v4(), TriggerKind::Manual, RunMode::Dry)
        .await
        .unwrap();

    assert_eq!(scraper.calls.load(Ordering::SeqCst), 3);
    let outcome = result.outcome("throttled").unwrap();
    assert!(outcome.is_clean());
    assert_eq!(outcome.successes, 1);
    assert_eq!(result.new_jobs.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_all_sources_failing_still_completes() {
    let a = Arc::new(FailingScraper::timing_out("a"));
    let b = Arc::new(FailingScraper::new("b", || FetchError::ServerError(502)));
    let repo = create_mock_repository();
    let pipeline = pipeline(
        vec![as_source(&a), as_source(&b)],
        repo.clone(),
        search_config(&["Engineer", "Rust"]),
        2,
    );

    let result = pipeline
        .execute(Uuid::new_v4(), TriggerKind::Scheduled, RunMode::Live)
        .await
        .unwrap();

    assert!(result.new_jobs.is_empty());
    // two searches per source, two attempts each
    assert_eq!(a.attempt_count(), 4);
    assert_eq!(b.attempt_count(), 4);
    assert_eq!(result.total_failures(), 4);
    assert_eq!(
        result.outcome("b").unwrap().last_error.as_deref(),
        Some("Server error: 502")
    );
    assert_eq!(repo.recent_runs(1).unwrap()[0].status, "ok");
}
