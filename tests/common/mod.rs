//! Common test utilities

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use url::Url;

use jobscout::config::SearchConfig;
use jobscout::crawler::{
    LimiterPolicy, Orchestrator, RobotsPolicy, Scraper, SharedScraper, SourceRegistry,
};
use jobscout::models::{Job, JobScore, RawListing, RunRecord, SearchTerm, TermKind};
use jobscout::pipeline::RunPipeline;
use jobscout::storage::{
    Admission, DedupStore, Fingerprint, JobRepository, MockJobRepository, ScoreFn,
    SharedJobRepository,
};
use jobscout::utils::error::{FetchError, StoreError, StoreResult};
use jobscout::utils::retry::RetryConfig;

/// Score function that leaves every job at 0, unflagged
pub fn unscored(_: &RawListing) -> JobScore {
    JobScore::default()
}

/// Create a listing with default company and location
pub fn listing(source: &str, title: &str, url: &str) -> RawListing {
    RawListing::new(source, title, "Acme Corp", url).with_location("Remote")
}

/// Fast retry policy for tests: `attempts` total, 10ms base delay
pub fn fast_policy(attempts: u32) -> LimiterPolicy {
    LimiterPolicy::unpaced(RetryConfig::with_delays(
        attempts,
        Duration::from_millis(10),
        Duration::from_millis(100),
    ))
}

/// Search settings with the given keywords and a single location
pub fn search_config(keywords: &[&str]) -> SearchConfig {
    SearchConfig {
        keywords: keywords.iter().map(|k| SearchTerm::new(*k)).collect(),
        locations: vec!["Remote".to_string()],
        ..Default::default()
    }
}

/// Erase a concrete scraper for registration
pub fn as_source<S: Scraper + 'static>(scraper: &Arc<S>) -> SharedScraper {
    scraper.clone()
}

/// Pipeline over `sources` with fast retries and no deadline
pub fn pipeline(
    sources: Vec<SharedScraper>,
    repo: SharedJobRepository,
    search: SearchConfig,
    attempts: u32,
) -> RunPipeline {
    let registry = sources
        .into_iter()
        .fold(SourceRegistry::builder(), |b, s| b.register(s))
        .build_all();
    let orchestrator = Orchestrator::new(registry).with_policy(|_| fast_policy(attempts));
    RunPipeline::new(orchestrator, DedupStore::new(repo), search)
}

// ============================================================================
// Scrapers
// ============================================================================

/// Returns the same listings for every search and records the calls
pub struct StubScraper {
    name: String,
    listings: Vec<RawListing>,
    robots: Option<Url>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl StubScraper {
    pub fn new(name: &str, listings: Vec<RawListing>) -> Self {
        Self {
            name: name.to_string(),
            listings,
            robots: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Stub returning `count` distinct listings
    pub fn with_jobs(name: &str, count: usize) -> Self {
        let listings = (0..count)
            .map(|i| {
                listing(
                    name,
                    &format!("Engineer {i}"),
                    &format!("https://{name}.test/jobs/{i}"),
                )
            })
            .collect();
        Self::new(name, listings)
    }

    pub fn with_robots_target(mut self, url: &str) -> Self {
        self.robots = Url::parse(url).ok();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Scraper for StubScraper {
    fn name(&self) -> &str {
        &self.name
    }

    fn robots_target(&self) -> Option<Url> {
        self.robots.clone()
    }

    async fn search(&self, keyword: &str, location: &str) -> Result<Vec<RawListing>, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((keyword.to_string(), location.to_string()));
        Ok(self.listings.clone())
    }
}

/// Fails every search with the error produced by `make_error`
pub struct FailingScraper {
    name: String,
    make_error: fn() -> FetchError,
    pub attempts: AtomicU32,
    pub attempted_at: Mutex<Vec<Instant>>,
}

impl FailingScraper {
    pub fn new(name: &str, make_error: fn() -> FetchError) -> Self {
        Self {
            name: name.to_string(),
            make_error,
            attempts: AtomicU32::new(0),
            attempted_at: Mutex::new(Vec::new()),
        }
    }

    pub fn timing_out(name: &str) -> Self {
        Self::new(name, || FetchError::Timeout)
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Gaps between consecutive attempts
    pub fn gaps(&self) -> Vec<Duration> {
        let times = self.attempted_at.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl Scraper for FailingScraper {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _keyword: &str, _location: &str) -> Result<Vec<RawListing>, FetchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.attempted_at.lock().unwrap().push(Instant::now());
        Err((self.make_error)())
    }
}

/// Sleeps before answering each search
pub struct SlowScraper {
    name: String,
    delay: Duration,
    listings: Vec<RawListing>,
}

impl SlowScraper {
    pub fn new(name: &str, delay: Duration, listings: Vec<RawListing>) -> Self {
        Self {
            name: name.to_string(),
            delay,
            listings,
        }
    }
}

#[async_trait]
impl Scraper for SlowScraper {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _keyword: &str, _location: &str) -> Result<Vec<RawListing>, FetchError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.listings.clone())
    }
}

// ============================================================================
// Robots
// ============================================================================

/// Denies every URL on the listed hosts
pub struct DenyHosts {
    hosts: HashSet<String>,
}

impl DenyHosts {
    pub fn new(hosts: &[&str]) -> Self {
        Self {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
        }
    }
}

#[async_trait]
impl RobotsPolicy for DenyHosts {
    async fn is_allowed(&self, target: &Url, _user_agent: &str) -> bool {
        target
            .host_str()
            .map(|h| !self.hosts.contains(h))
            .unwrap_or(true)
    }
}

// ============================================================================
// Repositories
// ============================================================================

/// Repository whose job table is unavailable; the run log still works
pub struct BrokenJobTable {
    inner: MockJobRepository,
}

impl BrokenJobTable {
    pub fn new() -> Self {
        Self {
            inner: MockJobRepository::new(),
        }
    }
}

impl JobRepository for BrokenJobTable {
    fn admit(
        &self,
        _listings: &[RawListing],
        _seen_at: DateTime<Utc>,
        _score: &ScoreFn<'_>,
    ) -> StoreResult<Admission> {
        Err(StoreError::Corrupt("jobs table unreadable".to_string()))
    }

    fn contains(&self, fingerprint: &Fingerprint) -> StoreResult<bool> {
        self.inner.contains(fingerprint)
    }

    fn get(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Job>> {
        self.inner.get(fingerprint)
    }

    fn unseen(&self, limit: Option<usize>) -> StoreResult<Vec<Job>> {
        self.inner.unseen(limit)
    }

    fn mark_notified(&self, fingerprints: &[Fingerprint]) -> StoreResult<usize> {
        self.inner.mark_notified(fingerprints)
    }

    fn count(&self) -> StoreResult<usize> {
        self.inner.count()
    }

    fn add_term(&self, kind: TermKind, term: &SearchTerm) -> StoreResult<bool> {
        self.inner.add_term(kind, term)
    }

    fn remove_term(&self, kind: TermKind, text: &str) -> StoreResult<bool> {
        self.inner.remove_term(kind, text)
    }

    fn list_terms(&self, kind: TermKind) -> StoreResult<Vec<SearchTerm>> {
        self.inner.list_terms(kind)
    }

    fn record_run(&self, record: &RunRecord) -> StoreResult<()> {
        self.inner.record_run(record)
    }

    fn recent_runs(&self, limit: usize) -> StoreResult<Vec<RunRecord>> {
        self.inner.recent_runs(limit)
    }
}

/// Mock repository whose run log rejects the first `failures` writes
pub struct FailingRunLog {
    pub inner: MockJobRepository,
    failures: AtomicU32,
}

impl FailingRunLog {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: MockJobRepository::new(),
            failures: AtomicU32::new(failures),
        }
    }
}

impl JobRepository for FailingRunLog {
    fn admit(
        &self,
        listings: &[RawListing],
        seen_at: DateTime<Utc>,
        score: &ScoreFn<'_>,
    ) -> StoreResult<Admission> {
        self.inner.admit(listings, seen_at, score)
    }

    fn contains(&self, fingerprint: &Fingerprint) -> StoreResult<bool> {
        self.inner.contains(fingerprint)
    }

    fn get(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Job>> {
        self.inner.get(fingerprint)
    }

    fn unseen(&self, limit: Option<usize>) -> StoreResult<Vec<Job>> {
        self.inner.unseen(limit)
    }

    fn mark_notified(&self, fingerprints: &[Fingerprint]) -> StoreResult<usize> {
        self.inner.mark_notified(fingerprints)
    }

    fn count(&self) -> StoreResult<usize> {
        self.inner.count()
    }

    fn add_term(&self, kind: TermKind, term: &SearchTerm) -> StoreResult<bool> {
        self.inner.add_term(kind, term)
    }

    fn remove_term(&self, kind: TermKind, text: &str) -> StoreResult<bool> {
        self.inner.remove_term(kind, text)
    }

    fn list_terms(&self, kind: TermKind) -> StoreResult<Vec<SearchTerm>> {
        self.inner.list_terms(kind)
    }

    fn record_run(&self, record: &RunRecord) -> StoreResult<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Corrupt("run_log is read-only".to_string()));
        }
        self.inner.record_run(record)
    }

    fn recent_runs(&self, limit: usize) -> StoreResult<Vec<RunRecord>> {
        self.inner.recent_runs(limit)
    }
}
