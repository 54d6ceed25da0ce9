//! Configuration management for jobscout
//!
//! This module handles loading and validating configuration from a TOML
//! file and environment variables. Every field has a default, so an empty
//! file (or no file at all) yields a runnable configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::crawler::feed::FeedSourceConfig;
use crate::models::{ExperienceLevel, SearchTerm};

/// Longest accepted scheduling interval, one year
pub const MAX_INTERVAL_HOURS: f64 = 24.0 * 365.0;

/// Longest accepted pacing, jitter or backoff delay, one day
pub const MAX_DELAY_SECONDS: f64 = 24.0 * 3600.0;

/// Longest accepted request timeout or run deadline, one day
pub const MAX_TIMEOUT_SECS: u64 = 24 * 3600;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// What to search for and how to score it
    pub search: SearchConfig,

    /// Source selection, pacing and retry
    pub scraper: ScraperConfig,

    /// Run cadence and dispatch policy
    pub scheduler: SchedulerConfig,

    /// Persistence
    pub storage: StorageConfig,

    /// Notification channels and export
    pub notify: NotifyConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Search terms and filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Keywords (plain strings or `{ text, weight }`)
    pub keywords: Vec<SearchTerm>,

    /// Tags matched against title and description
    pub tags: Vec<SearchTerm>,

    /// Locations searched for each keyword
    pub locations: Vec<String>,

    /// Seniority filter used by the scorer
    pub experience_level: Option<ExperienceLevel>,

    /// Prefer remote listings
    pub remote_filter: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            tags: Vec::new(),
            locations: vec![String::from("Remote")],
            experience_level: None,
            remote_filter: false,
        }
    }
}

/// Per-source overrides of the shared pacing settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceOverride {
    pub rate_limit_seconds: Option<f64>,
    pub max_retries: Option<u32>,
}

/// Scraper-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Sources to enable, in order (empty = every configured source)
    pub enabled_sources: Vec<String>,

    /// Minimum delay between two requests of one source
    pub rate_limit_seconds: f64,

    /// Uniform random extra delay added by the pacer
    pub jitter_seconds: f64,

    /// Total attempts per search, including the first
    pub max_retries: u32,

    /// Delay before the second attempt; doubles afterwards
    pub backoff_base_seconds: f64,

    /// Cap on a single backoff delay
    pub backoff_max_seconds: f64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Fixed User-Agent (empty = rotate through a browser pool)
    pub user_agent: String,

    /// Check robots.txt before a source's first fetch of a run
    pub respect_robots: bool,

    /// How long a fetched robots.txt stays valid
    pub robots_cache_secs: u64,

    /// Per-source pacing overrides, keyed by source name
    pub overrides: BTreeMap<String, SourceOverride>,

    /// Generic JSON feed sources
    pub feeds: Vec<FeedSourceConfig>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            enabled_sources: Vec::new(),
            rate_limit_seconds: 3.0,
            jitter_seconds: 0.5,
            max_retries: 3,
            backoff_base_seconds: 1.5,
            backoff_max_seconds: 60.0,
            request_timeout_secs: 20,
            user_agent: String::new(),
            respect_robots: true,
            robots_cache_secs: 3600,
            overrides: BTreeMap::new(),
            feeds: Vec::new(),
        }
    }
}

impl ScraperConfig {
    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Names of the sources to enable
    pub fn enabled(&self) -> Vec<String> {
        if self.enabled_sources.is_empty() {
            self.feeds.iter().map(|f| f.name.clone()).collect()
        } else {
            self.enabled_sources.clone()
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Hours between scheduled runs
    pub interval_hours: f64,

    /// Run immediately when the loop starts
    pub run_on_start: bool,

    /// Dispatch even when a run found no new jobs
    pub send_empty_run: bool,

    /// Bound on the collection phase of a run (none when absent)
    pub run_deadline_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_hours: 3.0,
            run_on_start: true,
            send_empty_run: false,
            run_deadline_secs: None,
        }
    }
}

impl SchedulerConfig {
    /// Interval between runs, clamped to [`MAX_INTERVAL_HOURS`]; zero when not a positive number
    pub fn interval(&self) -> Duration {
        if self.interval_hours > 0.0 {
            let hours = self.interval_hours.min(MAX_INTERVAL_HOURS);
            Duration::try_from_secs_f64(hours * 3600.0).unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs
            .map(|secs| Duration::from_secs(secs.min(MAX_TIMEOUT_SECS)))
    }
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("storage/jobs.db"),
        }
    }
}

/// Notification and export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Webhook URLs receiving a JSON digest of each run
    pub webhooks: Vec<String>,

    /// Write the digest to the log
    pub log_digest: bool,

    /// Jobs listed per digest before "...and N more"
    pub digest_limit: usize,

    /// Append new jobs as JSON lines to this file after each live run
    pub export_path: Option<PathBuf>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhooks: Vec::new(),
            log_digest: true,
            digest_limit: 10,
            export_path: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn check_delay(name: &str, seconds: f64) -> Result<()> {
    if !seconds.is_finite() || !(0.0..=MAX_DELAY_SECONDS).contains(&seconds) {
        anyhow::bail!("{name} must be between 0 and {MAX_DELAY_SECONDS} seconds");
    }
    Ok(())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => {
            let value = raw
                .trim()
                .parse::<T>()
                .map_err(|_| anyhow::anyhow!("Invalid value for {name}: {raw}"))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables over defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// File (or defaults) plus environment overrides, validated
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Overlay `JOBSCOUT_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("JOBSCOUT_DB_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Some(hours) = env_parse::<f64>("JOBSCOUT_INTERVAL_HOURS")? {
            self.scheduler.interval_hours = hours;
        }
        if let Some(rate) = env_parse::<f64>("JOBSCOUT_RATE_LIMIT")? {
            self.scraper.rate_limit_seconds = rate;
        }
        if let Some(retries) = env_parse::<u32>("JOBSCOUT_MAX_RETRIES")? {
            self.scraper.max_retries = retries;
        }
        if let Ok(url) = std::env::var("JOBSCOUT_WEBHOOK_URL") {
            if !url.trim().is_empty() && !self.notify.webhooks.contains(&url) {
                self.notify.webhooks.push(url);
            }
        }
        if let Ok(level) = std::env::var("JOBSCOUT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("JOBSCOUT_LOG_FORMAT") {
            self.logging.format = format;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let scraper = &self.scraper;

        if scraper.max_retries == 0 {
            anyhow::bail!("max_retries must be at least 1 (it counts total attempts)");
        }
        check_delay("rate_limit_seconds", scraper.rate_limit_seconds)?;
        check_delay("jitter_seconds", scraper.jitter_seconds)?;
        check_delay("backoff_base_seconds", scraper.backoff_base_seconds)?;
        check_delay("backoff_max_seconds", scraper.backoff_max_seconds)?;
        if scraper.backoff_max_seconds < scraper.backoff_base_seconds {
            anyhow::bail!("backoff_max_seconds must be at least backoff_base_seconds");
        }
        if scraper.request_timeout_secs == 0 || scraper.request_timeout_secs > MAX_TIMEOUT_SECS {
            anyhow::bail!("request_timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}");
        }

        for (source, o) in &scraper.overrides {
            if o.max_retries == Some(0) {
                anyhow::bail!("overrides.{source}.max_retries must be at least 1");
            }
            if let Some(rate) = o.rate_limit_seconds {
                check_delay(&format!("overrides.{source}.rate_limit_seconds"), rate)?;
            }
        }

        let mut names = HashSet::new();
        for feed in &scraper.feeds {
            if feed.name.trim().is_empty() {
                anyhow::bail!("feed name must not be empty");
            }
            if !names.insert(feed.name.as_str()) {
                anyhow::bail!("duplicate feed name: {}", feed.name);
            }
            if !feed.url_template.contains("{keyword}") {
                anyhow::bail!("feed {} url_template must contain {{keyword}}", feed.name);
            }
        }

        for term in self.search.keywords.iter().chain(&self.search.tags) {
            if let Some(w) = term.weight {
                if !w.is_finite() || w < 0.0 {
                    anyhow::bail!("weight of '{}' must be a non-negative number", term.text);
                }
            }
        }

        let hours = self.scheduler.interval_hours;
        if !hours.is_finite() || hours <= 0.0 || hours > MAX_INTERVAL_HOURS {
            anyhow::bail!("interval_hours must be positive and at most {MAX_INTERVAL_HOURS}");
        }
        if let Some(deadline) = self.scheduler.run_deadline_secs {
            if deadline == 0 || deadline > MAX_TIMEOUT_SECS {
                anyhow::bail!("run_deadline_secs must be between 1 and {MAX_TIMEOUT_SECS} when set");
            }
        }
        if self.notify.digest_limit == 0 {
            anyhow::bail!("digest_limit must be greater than 0");
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        Ok(())
    }
}
