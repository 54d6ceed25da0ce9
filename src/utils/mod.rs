//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Option<Regex>> = OnceLock::new();

    match WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").ok()) {
        Some(re) => re.replace_all(text.trim(), " ").to_string(),
        None => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

/// Lower-case and whitespace-normalize a term for comparisons
pub fn fold(text: &str) -> String {
    normalize_whitespace(text).to_lowercase()
}

/// Origin key (`scheme://host:port`) for a URL
pub fn origin_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let port = url
        .port_or_known_default()
        .map(|p| format!(":{p}"))
        .unwrap_or_default();
    Some(format!("{}://{}{}", url.scheme(), host, port))
}

/// Truncate text to a maximum number of characters
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  hello   world  "), "hello world");
        assert_eq!(normalize_whitespace("hello\n\nworld"), "hello world");
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold("  ML\tEngineer "), "ml engineer");
    }

    #[test]
    fn test_origin_key() {
        let url = Url::parse("https://jobs.example.com/search").unwrap();
        assert_eq!(origin_key(&url).unwrap(), "https://jobs.example.com:443");

        let url = Url::parse("http://127.0.0.1:8080/a").unwrap();
        assert_eq!(origin_key(&url).unwrap(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("very long text here", 10), "very lo...");
        assert_eq!(truncate_text("äöüäöüäöüäöü", 5), "äö...");
    }
}
