//! Robots-exclusion gate
//!
//! Checked once per source per run, before the source's first fetch. A
//! disallowed source is skipped for the whole run and not retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use robotstxt::DefaultMatcher;
use tokio::sync::RwLock;
use tokio::time::Instant;
use url::Url;

use super::fetcher::HttpFetcher;
use crate::utils::error::FetchError;
use crate::utils::origin_key;

/// Decides whether a URL may be fetched
#[async_trait]
pub trait RobotsPolicy: Send + Sync {
    async fn is_allowed(&self, target: &Url, user_agent: &str) -> bool;
}

/// Thread-safe shared robots policy
pub type SharedRobotsPolicy = Arc<dyn RobotsPolicy>;

/// Policy that permits everything (`respect_robots = false`)
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl RobotsPolicy for AllowAll {
    async fn is_allowed(&self, _target: &Url, _user_agent: &str) -> bool {
        true
    }
}

#[derive(Clone)]
struct CachedRobots {
    /// `None` when robots.txt was absent or unreachable
    body: Option<String>,
    fetched_at: Instant,
}

/// Fetches `<origin>/robots.txt` and caches it per origin
pub struct HttpRobotsPolicy {
    fetcher: HttpFetcher,
    ttl: Duration,
    cache: RwLock<HashMap<String, CachedRobots>>,
}

impl HttpRobotsPolicy {
    pub fn new(fetcher: HttpFetcher, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn robots_for(&self, origin: &str) -> Option<String> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(origin) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return entry.body.clone();
                }
            }
        }

        let url = format!("{origin}/robots.txt");
        let body = match self.fetcher.get_text(&url).await {
            Ok(body) => Some(body),
            Err(FetchError::ClientError(status)) => {
                tracing::debug!(%url, status, "No robots.txt, allowing all");
                None
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "robots.txt unavailable, allowing all");
                None
            }
        };

        self.cache.write().await.insert(
            origin.to_string(),
            CachedRobots {
                body: body.clone(),
                fetched_at: Instant::now(),
            },
        );
        body
    }
}

#[async_trait]
impl RobotsPolicy for HttpRobotsPolicy {
    async fn is_allowed(&self, target: &Url, user_agent: &str) -> bool {
        let Some(origin) = origin_key(target) else {
            return true;
        };
        let Some(body) = self.robots_for(&origin).await else {
            return true;
        };

        is_allowed_by(&body, user_agent, target.as_str())
    }
}

/// Match a robots.txt body for one user agent
///
/// Only the product token of the agent string (before the first `/` or
/// space) is matched, as robots.txt groups name products.
pub fn is_allowed_by(robots_body: &str, user_agent: &str, url: &str) -> bool {
    let product = user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .find(|s| !s.is_empty())
        .unwrap_or("*");

    let mut matcher = DefaultMatcher::default();
    matcher.one_agent_allowed_by_robots(robots_body, product, url)
}
