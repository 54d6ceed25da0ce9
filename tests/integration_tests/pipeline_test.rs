//! End-to-end pipeline integration tests
//!
//! Tests the complete workflow:
//! 1. Term snapshot (configured + stored keywords)
//! 2. Source fan-out (stubbed sources)
//! 3. Deduplication against the store
//! 4. Scoring
//! 5. Run log

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use jobscout::crawler::{Orchestrator, SourceRegistry};
use jobscout::models::{RunMode, SearchTerm, SkipReason, TermKind, TriggerKind};
use jobscout::pipeline::RunPipeline;
use jobscout::storage::{create_mock_repository, DedupStore, SqliteJobRepository};

use crate::common::{
    as_source, fast_policy, listing, pipeline, search_config, unscored, DenyHosts,
    FailingScraper, SlowScraper, StubScraper,
};

async fn run(pipeline: &RunPipeline) -> jobscout::models::RunResult {
    pipeline
        .execute(Uuid::new_v4(), TriggerKind::Manual, RunMode::Dry)
        .await
        .unwrap()
}

// ============================================================================
// Deduplication
// ============================================================================

#[tokio::test]
async fn test_known_fingerprint_counted_as_duplicate() {
    let listings = vec![
        listing("board", "ML Engineer", "https://board.test/jobs/1"),
        listing("board", "Senior ML Engineer", "https://board.test/jobs/2"),
        listing("board", "ML Engineer II", "https://board.test/jobs/3"),
    ];
    let repo = create_mock_repository();
    repo.admit(&listings[1..2], Utc::now(), &unscored).unwrap();

    let stub = StubScraper::new("board", listings).shared();
    let pipeline = pipeline(
        vec![as_source(&stub)],
        repo.clone(),
        search_config(&["ML Engineer"]),
        3,
    );

    let result = run(&pipeline).await;

    assert_eq!(result.new_jobs.len(), 2);
    assert_eq!(result.duplicates, 1);
    let titles: Vec<_> = result.new_jobs.iter().map(|j| j.title()).collect();
    assert_eq!(titles, vec!["ML Engineer", "ML Engineer II"]);
    assert_eq!(repo.count().unwrap(), 3);
}

#[tokio::test]
async fn test_second_run_reports_nothing_new() {
    let repo = create_mock_repository();
    let stub = StubScraper::with_jobs("board", 4).shared();
    let pipeline = pipeline(vec![as_source(&stub)], repo.clone(), search_config(&["Engineer"]), 3);

    let first = run(&pipeline).await;
    let second = run(&pipeline).await;

    assert_eq!(first.new_jobs.len(), 4);
    assert_eq!(first.duplicates, 0);
    assert!(second.new_jobs.is_empty());
    assert_eq!(second.duplicates, 4);
    assert_eq!(repo.count().unwrap(), 4);
}

#[tokio::test]
async fn test_same_listing_from_two_keywords_admitted_once() {
    let repo = create_mock_repository();
    // Every search returns the same two listings
    let stub = StubScraper::with_jobs("board", 2).shared();
    let pipeline = pipeline(
        vec![as_source(&stub)],
        repo.clone(),
        search_config(&["Engineer", "Developer"]),
        3,
    );

    let result = run(&pipeline).await;

    assert_eq!(result.new_jobs.len(), 2);
    assert_eq!(result.duplicates, 2);
}

#[tokio::test]
async fn test_url_variants_do_not_create_new_jobs() {
    let repo = create_mock_repository();
    let stub = StubScraper::new(
        "board",
        vec![
            listing("board", "Rust Engineer", "https://board.test/jobs/7"),
            listing("board", "Rust Engineer", "https://BOARD.test/jobs/7/#apply"),
        ],
    )
    .shared();
    let pipeline = pipeline(vec![as_source(&stub)], repo, search_config(&["Rust"]), 3);

    let result = run(&pipeline).await;

    assert_eq!(result.new_jobs.len(), 1);
    assert_eq!(result.duplicates, 1);
}

// ============================================================================
// Source Isolation
// ============================================================================

#[tokio::test]
async fn test_robots_disallowed_source_skipped() {
    let blocked = StubScraper::with_jobs("blocked", 3)
        .with_robots_target("https://blocked.test/api/search")
        .shared();
    let open = StubScraper::with_jobs("open", 2)
        .with_robots_target("https://open.test/api/search")
        .shared();

    let registry = SourceRegistry::builder()
        .register(blocked.clone())
        .register(open.clone())
        .build_all();
    let orchestrator = Orchestrator::new(registry)
        .with_policy(|_| fast_policy(3))
        .with_robots(Arc::new(DenyHosts::new(&["blocked.test"])), "jobscout");
    let pipeline = RunPipeline::new(
        orchestrator,
        DedupStore::new(create_mock_repository()),
        search_config(&["Engineer"]),
    );

    let result = run(&pipeline).await;

    let skipped = result.outcome("blocked").unwrap();
    assert_eq!(skipped.skip, Some(SkipReason::RobotsDisallowed));
    assert_eq!(skipped.listings, 0);
    assert_eq!(blocked.call_count(), 0);

    let ok = result.outcome("open").unwrap();
    assert!(ok.is_clean());
    assert_eq!(ok.listings, 2);
    assert_eq!(result.new_jobs.len(), 2);
    assert!(result.new_jobs.iter().all(|j| j.source() == "open"));
    assert_eq!(result.skipped_sources(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timing_out_source_retried_with_growing_backoff() {
    let failing = Arc::new(FailingScraper::timing_out("flaky"));
    let healthy = StubScraper::with_jobs("healthy", 3).shared();
    let pipeline = pipeline(
        vec![as_source(&failing), as_source(&healthy)],
        create_mock_repository(),
        search_config(&["Engineer"]),
        3,
    );

    let result = run(&pipeline).await;

    assert_eq!(failing.attempt_count(), 3);
    let gaps = failing.gaps();
    assert_eq!(gaps.len(), 2);
    assert!(gaps[0] > Duration::ZERO);
    assert!(gaps[1] > gaps[0], "backoff must grow: {gaps:?}");

    let flaky = result.outcome("flaky").unwrap();
    assert_eq!(flaky.failures, 1);
    assert_eq!(flaky.successes, 0);
    assert_eq!(flaky.last_error.as_deref(), Some("Request timeout"));

    assert_eq!(result.new_jobs.len(), 3);
    assert!(!result.partial);
}

#[tokio::test]
async fn test_client_error_not_retried() {
    let failing = Arc::new(FailingScraper::new("gone", || {
        jobscout::utils::error::FetchError::ClientError(404)
    }));
    let pipeline = pipeline(
        vec![as_source(&failing)],
        create_mock_repository(),
        search_config(&["Engineer"]),
        5,
    );

    let result = run(&pipeline).await;

    assert_eq!(failing.attempt_count(), 1);
    assert_eq!(result.outcome("gone").unwrap().failures, 1);
}

// ============================================================================
// Search Matrix
// ============================================================================

#[tokio::test]
async fn test_searches_keyword_major_over_locations() {
    let stub = StubScraper::new("board", vec![]).shared();
    let mut search = search_config(&["Rust", "Go"]);
    search.locations = vec!["Berlin".into(), "Remote".into()];
    let pipeline = pipeline(vec![as_source(&stub)], create_mock_repository(), search, 3);

    run(&pipeline).await;

    let calls = stub.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            ("Rust".to_string(), "Berlin".to_string()),
            ("Rust".to_string(), "Remote".to_string()),
            ("Go".to_string(), "Berlin".to_string()),
            ("Go".to_string(), "Remote".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_stored_keywords_join_configured_ones() {
    let repo = create_mock_repository();
    repo.add_term(TermKind::Keyword, &SearchTerm::new("Data Engineer"))
        .unwrap();
    repo.add_term(TermKind::Keyword, &SearchTerm::new("rust"))
        .unwrap();

    let stub = StubScraper::new("board", vec![]).shared();
    let pipeline = pipeline(vec![as_source(&stub)], repo, search_config(&["Rust"]), 3);

    let snapshot = pipeline.snapshot().await.unwrap();
    assert_eq!(snapshot.plan.keywords, vec!["Rust", "Data Engineer"]);

    run(&pipeline).await;
    let keywords: Vec<String> = stub.calls.lock().unwrap().iter().map(|c| c.0.clone()).collect();
    assert_eq!(keywords, vec!["Rust", "Data Engineer"]);
}

#[tokio::test]
async fn test_no_keywords_queries_nothing() {
    let stub = StubScraper::with_jobs("board", 3).shared();
    let pipeline = pipeline(
        vec![as_source(&stub)],
        create_mock_repository(),
        search_config(&[]),
        3,
    );

    let result = run(&pipeline).await;

    assert_eq!(stub.call_count(), 0);
    assert!(result.new_jobs.is_empty());
    assert!(result.outcome("board").unwrap().is_clean());
}

// ============================================================================
// Scoring and Run Log
// ============================================================================

#[tokio::test]
async fn test_new_jobs_scored_and_persisted() {
    let repo: jobscout::storage::SharedJobRepository =
        Arc::new(SqliteJobRepository::in_memory().unwrap());
    let stub = StubScraper::new(
        "board",
        vec![
            listing("board", "Engineer", "https://board.test/jobs/1"),
            listing("board", "Office Manager", "https://board.test/jobs/2")
                .with_location("Paris"),
        ],
    )
    .shared();
    let pipeline = pipeline(vec![as_source(&stub)], repo.clone(), search_config(&["Engineer"]), 3);

    let result = run(&pipeline).await;

    // phrase 40 + word 5 + location 10
    assert_eq!(result.new_jobs[0].score, 55);
    assert_eq!(result.new_jobs[1].score, 0);
    assert!(result.new_jobs.iter().all(|j| !j.score_flagged));

    let stored = repo.get(&result.new_jobs[0].fingerprint).unwrap().unwrap();
    assert_eq!(stored.score, 55);
    assert!(!stored.notified);
}

#[tokio::test]
async fn test_scores_frozen_at_first_sight() {
    let repo = create_mock_repository();
    let stub = StubScraper::new(
        "board",
        vec![listing("board", "Platform Engineer", "https://board.test/jobs/1")],
    )
    .shared();

    let first = pipeline(vec![as_source(&stub)], repo.clone(), search_config(&["Engineer"]), 3);
    let job = run(&first).await.new_jobs.remove(0);

    // A later run with a different profile does not rescore stored jobs
    let second = pipeline(
        vec![as_source(&stub)],
        repo.clone(),
        search_config(&["Platform Engineer"]),
        3,
    );
    let result = run(&second).await;
    assert_eq!(result.duplicates, 1);

    let stored = repo.get(&job.fingerprint).unwrap().unwrap();
    assert_eq!(stored.score, job.score);
}

#[tokio::test]
async fn test_run_log_records_each_run() {
    let repo = create_mock_repository();
    let stub = StubScraper::with_jobs("board", 2).shared();
    let pipeline = pipeline(vec![as_source(&stub)], repo.clone(), search_config(&["Engineer"]), 3);

    let result = pipeline
        .execute(Uuid::new_v4(), TriggerKind::Scheduled, RunMode::Live)
        .await
        .unwrap();

    let runs = repo.recent_runs(10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, result.run_id.to_string());
    assert_eq!(runs[0].trigger, "scheduled");
    assert_eq!(runs[0].mode, "live");
    assert_eq!(runs[0].new_jobs, 2);
    assert_eq!(runs[0].status, "ok");
}

// ============================================================================
// Deadline
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_deadline_returns_partial_results() {
    let repo = create_mock_repository();
    let fast = StubScraper::with_jobs("fast", 2).shared();
    let slow = Arc::new(SlowScraper::new(
        "slow",
        Duration::from_secs(600),
        vec![listing("slow", "Never Seen", "https://slow.test/jobs/1")],
    ));
    let pipeline = pipeline(
        vec![as_source(&fast), as_source(&slow)],
        repo.clone(),
        search_config(&["Engineer"]),
        3,
    )
        .with_deadline(Some(Duration::from_secs(30)));

    let result = run(&pipeline).await;

    assert!(result.partial);
    assert_eq!(result.new_jobs.len(), 2);
    assert!(result.outcome("fast").unwrap().is_clean());
    assert_eq!(
        result.outcome("slow").unwrap().skip,
        Some(SkipReason::DeadlineExceeded)
    );

    // Partial results are still persisted
    assert_eq!(repo.count().unwrap(), 2);
    assert_eq!(repo.recent_runs(1).unwrap()[0].status, "partial");
}
