//! Job sources and the machinery that queries them
//!
//! - [`Scraper`]: the uniform contract every job board implements
//! - [`SourceRegistry`]: immutable name → scraper map built at startup
//! - [`limiter`]: per-source pacing plus retry with exponential backoff
//! - [`robots`]: robots-exclusion gate checked before a source's first fetch
//! - [`orchestrator`]: fan-out over sources × keywords × locations
//! - [`fetcher`] / [`feed`]: shared HTTP client and the generic JSON feed source
//!
//! Adding a source means implementing [`Scraper`] and registering it;
//! nothing else changes.

pub mod feed;
pub mod fetcher;
pub mod limiter;
pub mod orchestrator;
pub mod robots;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::models::RawListing;
use crate::utils::error::FetchError;

pub use feed::{FeedFieldMap, FeedSourceConfig, JsonFeedScraper};
pub use fetcher::HttpFetcher;
pub use limiter::{LimiterPolicy, SourceLimiter};
pub use orchestrator::{Harvest, Orchestrator, SearchPlan, SourceCheck};
pub use robots::{AllowAll, HttpRobotsPolicy, RobotsPolicy, SharedRobotsPolicy};

// ============================================================================
// Scraper Contract
// ============================================================================

/// A job board that can be searched by keyword and location
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Stable source name used in the registry, listings and reports
    fn name(&self) -> &str;

    /// URL whose robots.txt governs this source, if any
    fn robots_target(&self) -> Option<Url> {
        None
    }

    /// Run one search; an empty location means "anywhere"
    async fn search(&self, keyword: &str, location: &str) -> Result<Vec<RawListing>, FetchError>;
}

/// Thread-safe shared scraper
pub type SharedScraper = Arc<dyn Scraper>;

// ============================================================================
// Source Registry
// ============================================================================

/// Immutable mapping from source name to scraper
///
/// Built once with [`SourceRegistry::builder`] and passed explicitly to the
/// orchestrator. Enumeration order is the order in which sources were
/// enabled.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Arc<Vec<SharedScraper>>,
}

impl SourceRegistry {
    pub fn builder() -> SourceRegistryBuilder {
        SourceRegistryBuilder::default()
    }

    /// Look up a source by name
    pub fn get(&self, name: &str) -> Option<&SharedScraper> {
        self.sources.iter().find(|s| s.name() == name)
    }

    /// Enabled sources, in enable order
    pub fn enabled(&self) -> &[SharedScraper] {
        &self.sources
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}

/// Collects available scrapers before the registry is frozen
#[derive(Default)]
pub struct SourceRegistryBuilder {
    available: BTreeMap<String, SharedScraper>,
    order: Vec<String>,
}

impl SourceRegistryBuilder {
    /// Make a scraper available; a later registration with the same name
    /// replaces the earlier one
    pub fn register(mut self, scraper: SharedScraper) -> Self {
        let name = scraper.name().to_string();
        if self.available.insert(name.clone(), scraper).is_none() {
            self.order.push(name);
        }
        self
    }

    /// Freeze with every registered source enabled, in registration order
    pub fn build_all(self) -> SourceRegistry {
        let mut available = self.available;
        let sources = self
            .order
            .iter()
            .filter_map(|name| available.remove(name))
            .collect();
        SourceRegistry {
            sources: Arc::new(sources),
        }
    }

    /// Freeze with only the named sources enabled, in the given order
    ///
    /// Unknown names are logged and ignored; duplicates are enabled once.
    pub fn build<S: AsRef<str>>(self, enabled: &[S]) -> SourceRegistry {
        let mut available = self.available;
        let mut sources = Vec::with_capacity(enabled.len());

        for name in enabled {
            let name = name.as_ref();
            match available.remove(name) {
                Some(scraper) => sources.push(scraper),
                None if sources.iter().any(|s: &SharedScraper| s.name() == name) => {}
                None => {
                    tracing::warn!(source = %name, "Enabled source is not registered, ignoring");
                }
            }
        }

        SourceRegistry {
            sources: Arc::new(sources),
        }
    }
}
