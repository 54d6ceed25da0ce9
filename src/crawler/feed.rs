//! Generic JSON feed source
//!
//! Many job boards expose a JSON search endpoint. [`JsonFeedScraper`]
//! covers those without site-specific code: a URL template with
//! `{keyword}` and `{location}` placeholders, an optional JSON pointer to
//! the item array, and a map from listing fields to item keys.
//!
//! ```toml
//! [[scraper.feeds]]
//! name = "remoteboard"
//! url_template = "https://remoteboard.example/api/jobs?q={keyword}&where={location}"
//! items_pointer = "/data/jobs"
//!
//! [scraper.feeds.fields]
//! company = "/company/name"
//! url = "apply_url"
//! ```

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::fetcher::HttpFetcher;
use super::Scraper;
use crate::models::RawListing;
use crate::utils::error::FetchError;
use crate::utils::normalize_whitespace;

// ============================================================================
// Configuration
// ============================================================================

/// Item keys for each listing field
///
/// A value starting with `/` is a JSON pointer into the item; anything
/// else is a top-level key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedFieldMap {
    pub title: String,
    pub company: String,
    pub location: String,
    pub url: String,
    pub description: String,
    pub posted_at: String,
}

impl Default for FeedFieldMap {
    fn default() -> Self {
        Self {
            title: "title".to_string(),
            company: "company".to_string(),
            location: "location".to_string(),
            url: "url".to_string(),
            description: "description".to_string(),
            posted_at: "posted_at".to_string(),
        }
    }
}

/// One configured feed source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSourceConfig {
    /// Registry name
    pub name: String,

    /// Search URL with `{keyword}` / `{location}` placeholders
    pub url_template: String,

    /// JSON pointer to the array of items (root when absent)
    #[serde(default)]
    pub items_pointer: Option<String>,

    #[serde(default)]
    pub fields: FeedFieldMap,

    /// Check robots.txt of the feed host before the first fetch of a run
    #[serde(default = "default_true")]
    pub check_robots: bool,
}

fn default_true() -> bool {
    true
}

impl FeedSourceConfig {
    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
            items_pointer: None,
            fields: FeedFieldMap::default(),
            check_robots: true,
        }
    }

    pub fn with_items_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.items_pointer = Some(pointer.into());
        self
    }

    pub fn with_fields(mut self, fields: FeedFieldMap) -> Self {
        self.fields = fields;
        self
    }

    /// Expand the template for one search
    pub fn search_url(&self, keyword: &str, location: &str) -> String {
        self.url_template
            .replace("{keyword}", &encode(keyword))
            .replace("{location}", &encode(location))
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.trim().as_bytes()).collect()
}

// ============================================================================
// Scraper
// ============================================================================

/// Site-agnostic JSON search endpoint
pub struct JsonFeedScraper {
    config: FeedSourceConfig,
    fetcher: HttpFetcher,
}

impl JsonFeedScraper {
    pub fn new(config: FeedSourceConfig, fetcher: HttpFetcher) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &FeedSourceConfig {
        &self.config
    }

    /// Convert a decoded response body into listings
    ///
    /// Items without a title or URL are skipped.
    pub fn parse_items(&self, body: &Value) -> Result<Vec<RawListing>, FetchError> {
        let items = match self.config.items_pointer.as_deref() {
            Some(pointer) if !pointer.is_empty() => body.pointer(pointer).ok_or_else(|| {
                FetchError::Parse(format!("items pointer {pointer} not found"))
            })?,
            _ => body,
        };

        let items = items
            .as_array()
            .ok_or_else(|| FetchError::Parse("feed items are not an array".to_string()))?;

        let fields = &self.config.fields;
        let mut listings = Vec::with_capacity(items.len());
        let mut skipped = 0usize;

        for item in items {
            let title = field_text(item, &fields.title);
            let url = field_text(item, &fields.url);
            if title.is_empty() || url.is_empty() {
                skipped += 1;
                continue;
            }

            let mut listing = RawListing::new(
                self.config.name.clone(),
                title,
                field_text(item, &fields.company),
                url,
            )
            .with_location(field_text(item, &fields.location))
            .with_description(field_text(item, &fields.description));

            if let Some(posted) = lookup(item, &fields.posted_at).and_then(parse_posted_at) {
                listing = listing.with_posted_at(posted);
            }

            listings.push(listing);
        }

        if skipped > 0 {
            tracing::debug!(
                source = %self.config.name,
                skipped,
                "Skipped feed items without title or url"
            );
        }

        Ok(listings)
    }
}

#[async_trait]
impl Scraper for JsonFeedScraper {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn robots_target(&self) -> Option<Url> {
        if !self.config.check_robots {
            return None;
        }
        Url::parse(&self.config.search_url("", "")).ok()
    }

    async fn search(&self, keyword: &str, location: &str) -> Result<Vec<RawListing>, FetchError> {
        let url = self.config.search_url(keyword, location);
        let body: Value = self.fetcher.get_json(&url).await?;
        self.parse_items(&body)
    }
}

fn lookup<'a>(item: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        None
    } else if key.starts_with('/') {
        item.pointer(key)
    } else {
        item.get(key)
    }
}

fn field_text(item: &Value, key: &str) -> String {
    match lookup(item, key) {
        Some(Value::String(s)) => normalize_whitespace(s),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn parse_posted_at(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn scraper(config: FeedSourceConfig) -> JsonFeedScraper {
        JsonFeedScraper::new(config, HttpFetcher::new(Duration::from_secs(5)).unwrap())
    }

    #[test]
    fn test_search_url_encodes_placeholders() {
        let config = FeedSourceConfig::new("board", "https://board.test/api?q={keyword}&l={location}");
        assert_eq!(
            config.search_url("ML Engineer", "New York, NY"),
            "https://board.test/api?q=ML+Engineer&l=New+York%2C+NY"
        );
    }

    #[test]
    fn test_parse_items_with_pointer_and_field_map() {
        let config = FeedSourceConfig::new("board", "https://board.test/api?q={keyword}")
            .with_items_pointer("/data/jobs")
            .with_fields(FeedFieldMap {
                company: "/company/name".into(),
                url: "apply_url".into(),
                ..Default::default()
            });

        let body = json!({
            "data": { "jobs": [
                {
                    "title": "  ML   Engineer ",
                    "company": { "name": "Acme" },
                    "location": "Remote",
                    "apply_url": "https://acme.test/1",
                    "posted_at": "2024-05-01T12:00:00Z"
                },
                { "title": "No url here", "company": { "name": "Acme" } },
                {
                    "title": "Data Scientist",
                    "apply_url": "https://acme.test/2",
                    "posted_at": 1714564800
                }
            ]}
        });

        let listings = scraper(config).parse_items(&body).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].title, "ML Engineer");
        assert_eq!(listings[0].company, "Acme");
        assert_eq!(listings[0].source, "board");
        assert!(listings[0].posted_at.is_some());
        assert_eq!(listings[1].company, "");
        assert!(listings[1].posted_at.is_some());
    }

    #[test]
    fn test_parse_items_rejects_non_array() {
        let s = scraper(FeedSourceConfig::new("board", "https://board.test/"));
        assert!(matches!(
            s.parse_items(&json!({"jobs": []})),
            Err(FetchError::Parse(_))
        ));

        let s = scraper(
            FeedSourceConfig::new("board", "https://board.test/").with_items_pointer("/missing"),
        );
        assert!(s.parse_items(&json!({})).is_err());
    }

    #[test]
    fn test_robots_target() {
        let mut config = FeedSourceConfig::new("board", "https://board.test/api/search?q={keyword}");
        let target = scraper(config.clone()).robots_target().unwrap();
        assert_eq!(target.path(), "/api/search");

        config.check_robots = false;
        assert!(scraper(config).robots_target().is_none());
    }
}
