//! Listing identity and the deduplication store
//!
//! This module provides:
//! - [`Fingerprint`]: the identity key derived from normalized
//!   (source, title, company, URL)
//! - [`DedupStore`]: async facade over a [`JobRepository`] exposing the
//!   single "admit and score new listings" operation used by a run
//!
//! The insert-and-check happens inside the repository's transaction, so
//! a fingerprint reaching the store twice (same batch or concurrent
//! batches) is admitted exactly once.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::repository::{Admission, SharedJobRepository};
use crate::models::{Job, JobScore, RawListing, RunRecord, SearchTerm, TermKind};
use crate::utils::error::{StoreError, StoreResult};
use crate::utils::fold;

// ============================================================================
// Fingerprint
// ============================================================================

/// Stable identity of a job listing (lowercase hex SHA-256)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a listing
    ///
    /// Pure and total: any listing, including one with empty fields,
    /// yields a fingerprint. Description, location and posting date do
    /// not participate.
    pub fn of(listing: &RawListing) -> Self {
        Self::from_parts(&listing.source, &listing.title, &listing.company, &listing.url)
    }

    /// Compute the fingerprint from the raw identity fields
    pub fn from_parts(source: &str, title: &str, company: &str, url: &str) -> Self {
        let key = format!(
            "{}::{}::{}::{}",
            fold(source),
            fold(title),
            fold(company),
            normalize_url(url)
        );
        let digest = Sha256::digest(key.as_bytes());
        Self(format!("{digest:x}"))
    }

    /// Wrap a stored hex value
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for logs
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalize a listing URL for identity purposes
///
/// Trims, lower-cases, collapses whitespace, drops the fragment and any
/// trailing slashes.
pub fn normalize_url(url: &str) -> String {
    let folded = fold(url);
    let without_fragment = match folded.split_once('#') {
        Some((head, _)) => head,
        None => folded.as_str(),
    };
    without_fragment.trim_end_matches('/').to_string()
}

// ============================================================================
// Dedup Store
// ============================================================================

/// Async handle to the persistent fingerprint set
///
/// Repository calls are synchronous (SQLite); they run on the blocking
/// pool so source tasks are never stalled by disk I/O.
#[derive(Clone)]
pub struct DedupStore {
    repo: SharedJobRepository,
}

impl DedupStore {
    pub fn new(repo: SharedJobRepository) -> Self {
        Self { repo }
    }

    /// Underlying repository
    pub fn repository(&self) -> &SharedJobRepository {
        &self.repo
    }

    /// Partition listings into new and duplicate, persisting the new ones
    ///
    /// New listings are scored by `score` and stored together with their
    /// score, so a job is never persisted without one.
    pub async fn admit<F>(
        &self,
        listings: Vec<RawListing>,
        seen_at: DateTime<Utc>,
        score: F,
    ) -> StoreResult<Admission>
    where
        F: Fn(&RawListing) -> JobScore + Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || repo.admit(&listings, seen_at, &score))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Flag jobs as delivered
    pub async fn mark_notified(&self, fingerprints: Vec<Fingerprint>) -> StoreResult<usize> {
        if fingerprints.is_empty() {
            return Ok(0);
        }
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || repo.mark_notified(&fingerprints))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Stored keywords or tags
    pub async fn terms(&self, kind: TermKind) -> StoreResult<Vec<SearchTerm>> {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || repo.list_terms(kind))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Append a run-log entry
    pub async fn record_run(&self, record: RunRecord) -> StoreResult<()> {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || repo.record_run(&record))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Jobs not yet delivered, newest first
    pub async fn unseen(&self, limit: Option<usize>) -> StoreResult<Vec<Job>> {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || repo.unseen(limit))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}
