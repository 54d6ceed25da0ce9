//! Test fixtures for integration tests
//!
//! Provides sample feed bodies and robots.txt files

/// Feed body with two complete items and one missing its URL
pub const SAMPLE_FEED_JSON: &str = r#"
{
  "meta": { "total": 3 },
  "data": {
    "jobs": [
      {
        "title": "Senior Rust Engineer",
        "company": { "name": "Ferris Labs" },
        "location": "Remote",
        "apply_url": "https://ferris.test/jobs/1?utm_source=feed",
        "description": "Build async services in Rust and tokio.",
        "posted_at": "2024-05-01T12:00:00Z"
      },
      {
        "title": "Machine Learning Engineer",
        "company": { "name": "Acme" },
        "location": "New York, NY",
        "apply_url": "https://acme.test/careers/ml",
        "description": "Python, PyTorch, distributed training.",
        "posted_at": 1714564800
      },
      {
        "title": "Listing without a link",
        "company": { "name": "Nowhere" }
      }
    ]
  }
}
"#;

/// Feed body with no items
pub const EMPTY_FEED_JSON: &str = r#"{ "data": { "jobs": [] } }"#;

/// Feed body that is not valid JSON
pub const MALFORMED_FEED: &str = r#"{ "data": { "jobs": [ { "title": "#;

/// robots.txt forbidding the search API to every agent
pub const ROBOTS_DISALLOW_API: &str = "User-agent: *\nDisallow: /api/\n";

/// robots.txt allowing everything
pub const ROBOTS_ALLOW_ALL: &str = "User-agent: *\nDisallow:\n";

/// Number of usable items in [`SAMPLE_FEED_JSON`]
pub const SAMPLE_FEED_ITEMS: usize = 2;
