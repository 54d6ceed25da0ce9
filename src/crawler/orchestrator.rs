//! Fan-out of searches across sources
//!
//! Each enabled source runs in its own task and walks the keyword ×
//! location matrix in configured order through its [`SourceLimiter`].
//! Tasks report to a single collector over an mpsc channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  source A    │──┐
//! │ (robots gate,│  │
//! │  limiter)    │  │   SourceEvent    ┌─────────────┐
//! └──────────────┘  ├─────────────────▶│  Collector  │──▶ Harvest
//! ┌──────────────┐  │   mpsc channel   │ (deadline)  │
//! │  source B    │──┘                  └─────────────┘
//! └──────────────┘
//! ```
//!
//! A failing source only affects its own outcome. When the run deadline
//! expires, outstanding tasks are aborted and whatever was collected is
//! returned with `timed_out = true`.
//!
//! [`Orchestrator::check_sources`] issues a single search per source through
//! the same robots gate and limiter, for health checks outside a run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::limiter::{LimiterPolicy, SourceLimiter};
use super::robots::{AllowAll, SharedRobotsPolicy};
use super::{SharedScraper, SourceRegistry};
use crate::config::ScraperConfig;
use crate::metrics;
use crate::models::{RawListing, SkipReason, SourceOutcome};

const DEFAULT_ROBOTS_AGENT: &str = "jobscout";

// ============================================================================
// Search Plan
// ============================================================================

/// Keyword × location matrix for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPlan {
    pub keywords: Vec<String>,
    pub locations: Vec<String>,
}

impl SearchPlan {
    pub fn new(keywords: Vec<String>, locations: Vec<String>) -> Self {
        Self {
            keywords,
            locations,
        }
    }

    /// `(keyword, location)` pairs, keyword-major
    ///
    /// With no locations configured each keyword is searched once with an
    /// empty location.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let locations: Vec<String> = if self.locations.is_empty() {
            vec![String::new()]
        } else {
            self.locations.clone()
        };

        self.keywords
            .iter()
            .flat_map(|k| locations.iter().map(move |l| (k.clone(), l.clone())))
            .collect()
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Message from a source task to the collector
#[derive(Debug)]
enum SourceEvent {
    Searched {
        source: usize,
        listings: Vec<RawListing>,
    },
    Failed {
        source: usize,
        attempts: u32,
        error: String,
    },
    Skipped {
        source: usize,
        reason: SkipReason,
    },
    Finished {
        source: usize,
    },
}

/// Everything gathered by one fan-out
#[derive(Debug, Clone, Default)]
pub struct Harvest {
    /// Listings of all sources, grouped by source in registry order;
    /// within a source in keyword × location order
    pub listings: Vec<RawListing>,

    /// One outcome per enabled source, in registry order
    pub outcomes: Vec<SourceOutcome>,

    /// The deadline expired before every source finished
    pub timed_out: bool,
}

/// Result of one health-check search against a source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCheck {
    pub source: String,
    pub listings: usize,
    /// Up to two "title | company" lines from the response
    pub sample: Vec<String>,
    pub attempts: u32,
    pub error_kind: Option<&'static str>,
    pub error: Option<String>,
    pub skip: Option<SkipReason>,
    pub latency: Duration,
}

impl SourceCheck {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Default::default()
        }
    }

    /// The search ran and returned without error
    pub fn is_healthy(&self) -> bool {
        self.error.is_none() && self.skip.is_none()
    }
}

#[derive(Default)]
struct SourceProgress {
    listings: Vec<RawListing>,
    finished: bool,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs the search matrix over every enabled source
pub struct Orchestrator {
    registry: SourceRegistry,
    limiters: HashMap<String, Arc<SourceLimiter>>,
    robots: SharedRobotsPolicy,
    robots_agent: String,
    channel_buffer_size: usize,
}

impl Orchestrator {
    /// Create an orchestrator with default pacing and no robots checks
    pub fn new(registry: SourceRegistry) -> Self {
        let limiters = build_limiters(&registry, |_| LimiterPolicy::default());
        Self {
            registry,
            limiters,
            robots: Arc::new(AllowAll),
            robots_agent: DEFAULT_ROBOTS_AGENT.to_string(),
            channel_buffer_size: 256,
        }
    }

    /// Create an orchestrator using the scraper configuration
    pub fn from_config(
        registry: SourceRegistry,
        robots: SharedRobotsPolicy,
        config: &ScraperConfig,
    ) -> Self {
        let agent = if config.user_agent.trim().is_empty() {
            DEFAULT_ROBOTS_AGENT.to_string()
        } else {
            config.user_agent.clone()
        };

        Self::new(registry)
            .with_policy(|name| LimiterPolicy::for_source(config, name))
            .with_robots(robots, agent)
    }

    /// Replace every source's limiter policy
    pub fn with_policy(mut self, policy: impl Fn(&str) -> LimiterPolicy) -> Self {
        self.limiters = build_limiters(&self.registry, policy);
        self
    }

    /// Gate each source on robots.txt
    pub fn with_robots(
        mut self,
        robots: SharedRobotsPolicy,
        user_agent: impl Into<String>,
    ) -> Self {
        self.robots = robots;
        self.robots_agent = user_agent.into();
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Limiter of a source
    pub fn limiter(&self, source: &str) -> Option<&Arc<SourceLimiter>> {
        self.limiters.get(source)
    }

    /// Query every enabled source for every pair of the plan
    ///
    /// Never fails: source errors and skips are reported in the outcomes.
    pub async fn collect(&self, plan: &SearchPlan, deadline: Option<Instant>) -> Harvest {
        let sources = self.registry.enabled();
        let pairs = Arc::new(plan.pairs());

        tracing::info!(
            sources = sources.len(),
            searches_per_source = pairs.len(),
            "Starting source fan-out"
        );

        let (tx, mut rx) = mpsc::channel::<SourceEvent>(self.channel_buffer_size);
        let mut tasks = JoinSet::new();

        for (idx, scraper) in sources.iter().enumerate() {
            let Some(limiter) = self.limiters.get(scraper.name()).cloned() else {
                continue;
            };
            tasks.spawn(run_source(
                idx,
                Arc::clone(scraper),
                limiter,
                Arc::clone(&self.robots),
                self.robots_agent.clone(),
                Arc::clone(&pairs),
                tx.clone(),
            ));
        }
        drop(tx);

        let mut outcomes: Vec<SourceOutcome> =
            sources.iter().map(|s| SourceOutcome::new(s.name())).collect();
        let mut progress: Vec<SourceProgress> =
            sources.iter().map(|_| SourceProgress::default()).collect();

        let expiry = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expiry);

        let mut timed_out = false;
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => apply_event(event, &mut outcomes, &mut progress),
                    None => break,
                },
                _ = &mut expiry => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            tracing::warn!("Run deadline expired, aborting outstanding sources");
            tasks.shutdown().await;
            while let Ok(event) = rx.try_recv() {
                apply_event(event, &mut outcomes, &mut progress);
            }
        } else {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Source task ended abnormally");
                }
            }
        }

        for (outcome, state) in outcomes.iter_mut().zip(&progress) {
            if state.finished || outcome.skip.is_some() {
                continue;
            }
            if timed_out {
                outcome.skip = Some(SkipReason::DeadlineExceeded);
                metrics::record_source_skip(&outcome.source, SkipReason::DeadlineExceeded.as_str());
            } else {
                outcome.failures += 1;
                outcome.last_error = Some("source task aborted".to_string());
            }
        }

        let listings: Vec<RawListing> = progress.into_iter().flat_map(|p| p.listings).collect();

        for outcome in &outcomes {
            tracing::info!(
                source = %outcome.source,
                successes = outcome.successes,
                failures = outcome.failures,
                listings = outcome.listings,
                skip = outcome.skip.map(|s| s.as_str()).unwrap_or("-"),
                "Source finished"
            );
        }

        Harvest {
            listings,
            outcomes,
            timed_out,
        }
    }

    /// Run one search per enabled source and report how it went
    ///
    /// Nothing is collected or persisted. `only` restricts the check to
    /// the named source.
    pub async fn check_sources(
        &self,
        keyword: &str,
        location: &str,
        only: Option<&str>,
    ) -> Vec<SourceCheck> {
        let checks = self
            .registry
            .enabled()
            .iter()
            .filter(|s| only.map_or(true, |name| s.name() == name))
            .filter_map(|s| {
                let limiter = self.limiters.get(s.name())?;
                Some(self.check_source(s, limiter, keyword, location))
            });
        join_all(checks).await
    }

    async fn check_source(
        &self,
        scraper: &SharedScraper,
        limiter: &SourceLimiter,
        keyword: &str,
        location: &str,
    ) -> SourceCheck {
        let started = Instant::now();
        let mut check = SourceCheck::new(scraper.name());

        if let Some(target) = scraper.robots_target() {
            if !self.robots.is_allowed(&target, &self.robots_agent).await {
                check.skip = Some(SkipReason::RobotsDisallowed);
                check.latency = started.elapsed();
                return check;
            }
        }

        let mut attempts = 0;
        let result = limiter
            .call(|| {
                attempts += 1;
                scraper.search(keyword, location)
            })
            .await;
        check.latency = started.elapsed();
        check.attempts = attempts;

        match result {
            Ok(listings) => {
                check.listings = listings.len();
                check.sample = listings
                    .iter()
                    .take(2)
                    .map(|l| format!("{} | {}", l.title, l.company))
                    .collect();
            }
            Err(exhausted) => {
                check.error_kind = Some(exhausted.error.kind());
                check.error = Some(exhausted.error.to_string());
            }
        }

        tracing::debug!(
            source = %check.source,
            listings = check.listings,
            attempts = check.attempts,
            latency_ms = check.latency.as_millis() as u64,
            error_kind = check.error_kind.unwrap_or("-"),
            "Source checked"
        );
        check
    }
}

fn build_limiters(
    registry: &SourceRegistry,
    policy: impl Fn(&str) -> LimiterPolicy,
) -> HashMap<String, Arc<SourceLimiter>> {
    registry
        .enabled()
        .iter()
        .map(|s| {
            let name = s.name().to_string();
            let limiter = Arc::new(SourceLimiter::new(name.clone(), policy(&name)));
            (name, limiter)
        })
        .collect()
}

fn apply_event(
    event: SourceEvent,
    outcomes: &mut [SourceOutcome],
    progress: &mut [SourceProgress],
) {
    match event {
        SourceEvent::Searched { source, listings } => {
            outcomes[source].successes += 1;
            outcomes[source].listings += listings.len();
            progress[source].listings.extend(listings);
        }
        SourceEvent::Failed {
            source,
            attempts,
            error,
        } => {
            tracing::warn!(
                source = %outcomes[source].source,
                attempts,
                error = %error,
                "Search abandoned after retries"
            );
            metrics::record_source_failure(&outcomes[source].source);
            outcomes[source].failures += 1;
            outcomes[source].last_error = Some(error);
        }
        SourceEvent::Skipped { source, reason } => {
            metrics::record_source_skip(&outcomes[source].source, reason.as_str());
            outcomes[source].skip = Some(reason);
            progress[source].finished = true;
        }
        SourceEvent::Finished { source } => {
            progress[source].finished = true;
        }
    }
}

async fn run_source(
    idx: usize,
    scraper: SharedScraper,
    limiter: Arc<SourceLimiter>,
    robots: SharedRobotsPolicy,
    robots_agent: String,
    pairs: Arc<Vec<(String, String)>>,
    tx: mpsc::Sender<SourceEvent>,
) {
    let name = scraper.name().to_string();

    if let Some(target) = scraper.robots_target() {
        if !robots.is_allowed(&target, &robots_agent).await {
            tracing::warn!(source = %name, url = %target, "robots.txt disallows source, skipping");
            let _ = tx
                .send(SourceEvent::Skipped {
                    source: idx,
                    reason: SkipReason::RobotsDisallowed,
                })
                .await;
            return;
        }
    }

    for (keyword, location) in pairs.iter() {
        let event = match limiter.call(|| scraper.search(keyword, location)).await {
            Ok(mut listings) => {
                for listing in &mut listings {
                    listing.source.clone_from(&name);
                }
                tracing::debug!(
                    source = %name,
                    keyword = %keyword,
                    location = %location,
                    count = listings.len(),
                    "Search completed"
                );
                SourceEvent::Searched {
                    source: idx,
                    listings,
                }
            }
            Err(exhausted) => SourceEvent::Failed {
                source: idx,
                attempts: exhausted.attempts,
                error: exhausted.error.to_string(),
            },
        };

        if tx.send(event).await.is_err() {
            return;
        }
    }

    let _ = tx.send(SourceEvent::Finished { source: idx }).await;
}
