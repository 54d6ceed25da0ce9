//! HTTP-backed source tests
//!
//! Runs the JSON feed source against a wiremock server:
//! 1. Feed parsing through the full pipeline
//! 2. robots.txt gating
//! 3. HTTP error mapping and retry

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jobscout::crawler::{
    FeedFieldMap, FeedSourceConfig, HttpFetcher, HttpRobotsPolicy, JsonFeedScraper, Orchestrator,
    SourceRegistry,
};
use jobscout::models::{RunMode, RunResult, SkipReason, TriggerKind};
use jobscout::pipeline::RunPipeline;
use jobscout::storage::{create_mock_repository, DedupStore};

use super::fixtures::{
    EMPTY_FEED_JSON, MALFORMED_FEED, ROBOTS_ALLOW_ALL, ROBOTS_DISALLOW_API, SAMPLE_FEED_ITEMS,
    SAMPLE_FEED_JSON,
};
use crate::common::{fast_policy, search_config};

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(Duration::from_secs(5))
        .unwrap()
        .with_user_agent("jobscout-test/1.0")
}

fn feed_scraper(server: &MockServer) -> Arc<JsonFeedScraper> {
    let config = FeedSourceConfig::new(
        "board",
        format!("{}/api/jobs?q={{keyword}}&l={{location}}", server.uri()),
    )
    .with_items_pointer("/data/jobs")
    .with_fields(FeedFieldMap {
        company: "/company/name".into(),
        url: "apply_url".into(),
        ..Default::default()
    });
    Arc::new(JsonFeedScraper::new(config, fetcher()))
}

fn feed_pipeline(server: &MockServer, attempts: u32, check_robots: bool) -> RunPipeline {
    let registry = SourceRegistry::builder()
        .register(feed_scraper(server))
        .build_all();
    let mut orchestrator = Orchestrator::new(registry).with_policy(|_| fast_policy(attempts));
    if check_robots {
        let robots = HttpRobotsPolicy::new(fetcher(), Duration::from_secs(3600));
        orchestrator = orchestrator.with_robots(Arc::new(robots), "jobscout-test/1.0");
    }
    RunPipeline::new(
        orchestrator,
        DedupStore::new(create_mock_repository()),
        search_config(&["Rust"]),
    )
}

async fn run(pipeline: &RunPipeline) -> RunResult {
    pipeline
        .execute(Uuid::new_v4(), TriggerKind::Manual, RunMode::Dry)
        .await
        .unwrap()
}

// ============================================================================
// Feed Parsing
// ============================================================================

#[tokio::test]
async fn test_feed_listings_flow_through_pipeline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/jobs"))
        .and(query_param("q", "Rust"))
        .and(query_param("l", "Remote"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_FEED_JSON))
        .expect(1)
        .mount(&server)
        .await;

    let result = run(&feed_pipeline(&server, 3, false)).await;

    assert_eq!(result.new_jobs.len(), SAMPLE_FEED_ITEMS);
    let rust = &result.new_jobs[0];
    assert_eq!(rust.listing.title, "Senior Rust Engineer");
    assert_eq!(rust.listing.company, "Ferris Labs");
    assert_eq!(rust.listing.source, "board");
    assert!(rust.listing.posted_at.is_some());
    assert!(rust.score > result.new_jobs[1].score);

    let outcome = result.outcome("board").unwrap();
    assert_eq!(outcome.successes, 1);
    assert_eq!(outcome.listings, SAMPLE_FEED_ITEMS);
}

#[tokio::test]
async fn test_empty_feed_is_a_clean_search() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_FEED_JSON))
        .mount(&server)
        .await;

    let result = run(&feed_pipeline(&server, 3, false)).await;

    assert!(result.new_jobs.is_empty());
    assert!(result.outcome("board").unwrap().is_clean());
}

// ============================================================================
// robots.txt
// ============================================================================

#[tokio::test]
async fn test_robots_disallow_skips_feed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ROBOTS_DISALLOW_API))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_FEED_JSON))
        .expect(0)
        .mount(&server)
        .await;

    let result = run(&feed_pipeline(&server, 3, true)).await;

    let outcome = result.outcome("board").unwrap();
    assert_eq!(outcome.skip, Some(SkipReason::RobotsDisallowed));
    assert_eq!(outcome.successes, 0);
    assert!(result.new_jobs.is_empty());
}

#[tokio::test]
async fn test_robots_allow_and_missing_robots_proceed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ROBOTS_ALLOW_ALL))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_FEED_JSON))
        .mount(&server)
        .await;

    let result = run(&feed_pipeline(&server, 3, true)).await;
    assert_eq!(result.new_jobs.len(), SAMPLE_FEED_ITEMS);

    // No robots.txt at all (404) means allowed
    let bare = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_FEED_JSON))
        .mount(&bare)
        .await;

    let result = run(&feed_pipeline(&bare, 3, true)).await;
    assert!(result.outcome("board").unwrap().skip.is_none());
    assert_eq!(result.new_jobs.len(), SAMPLE_FEED_ITEMS);
}

// ============================================================================
// HTTP Errors
// ============================================================================

#[tokio::test]
async fn test_not_found_feed_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/jobs"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = run(&feed_pipeline(&server, 3, false)).await;

    let outcome = result.outcome("board").unwrap();
    assert_eq!(outcome.failures, 1);
    assert_eq!(outcome.last_error.as_deref(), Some("Client error: 404"));
}

#[tokio::test]
async fn test_server_error_retried_then_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/jobs"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_FEED_JSON))
        .expect(1)
        .mount(&server)
        .await;

    let result = run(&feed_pipeline(&server, 3, false)).await;

    assert!(result.outcome("board").unwrap().is_clean());
    assert_eq!(result.new_jobs.len(), SAMPLE_FEED_ITEMS);
}

#[tokio::test]
async fn test_malformed_feed_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MALFORMED_FEED))
        .expect(2)
        .mount(&server)
        .await;

    let result = run(&feed_pipeline(&server, 2, false)).await;

    let outcome = result.outcome("board").unwrap();
    assert_eq!(outcome.failures, 1);
    assert!(outcome
        .last_error
        .as_deref()
        .is_some_and(|e| e.starts_with("Parse error")));
}
