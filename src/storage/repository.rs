//! Repository Pattern for Database Abstraction
//!
//! This module provides the trait-based job repository that backs the
//! deduplication store, enabling:
//! - Easy testing with mock implementations
//! - Swappable storage backends
//! - Clear separation of concerns
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Run Pipeline                            │
//! │            (DedupStore, CLI management commands)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    JobRepository trait                      │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                       │
//!                    ▼                       ▼
//!          ┌─────────────────┐     ┌─────────────────┐
//!          │     SQLite      │     │      Mock       │
//!          │  Implementation │     │ Implementation  │
//!          └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use jobscout::storage::repository::{JobRepository, SqliteJobRepository};
//!
//! // Production: use SQLite
//! let repo = SqliteJobRepository::new("data/jobs.db")?;
//!
//! // Testing: use Mock
//! let mock_repo = MockJobRepository::new();
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::dedup::Fingerprint;
use crate::models::{Job, JobScore, RawListing, RunRecord, SearchTerm, TermKind};
use crate::utils::error::{StoreError, StoreResult};
use crate::utils::fold;

// ============================================================================
// Core Types
// ============================================================================

/// Result of admitting a batch of listings
#[derive(Debug, Clone, Default)]
pub struct Admission {
    /// Listings whose fingerprint was not yet stored, in input order
    pub new_jobs: Vec<Job>,

    /// Listings whose fingerprint was already present (including
    /// repeats inside the same batch)
    pub duplicates: usize,
}

/// Scores a listing the first time it is admitted
pub type ScoreFn<'a> = dyn Fn(&RawListing) -> JobScore + 'a;

// ============================================================================
// Repository Trait
// ============================================================================

/// Persistent job table, search-term table and run log
///
/// The job table is append-only: nothing in this trait deletes a job.
pub trait JobRepository: Send + Sync {
    /// Atomically insert every listing whose fingerprint is absent
    ///
    /// Each fingerprint is checked and inserted in one step, so a listing
    /// offered twice (in one batch or by concurrent callers) is admitted
    /// exactly once. `score` is called for new listings only and its
    /// result is written with the row, in the same transaction.
    fn admit(
        &self,
        listings: &[RawListing],
        seen_at: DateTime<Utc>,
        score: &ScoreFn<'_>,
    ) -> StoreResult<Admission>;

    /// Check whether a fingerprint is stored
    fn contains(&self, fingerprint: &Fingerprint) -> StoreResult<bool>;

    /// Get a job by fingerprint
    fn get(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Job>>;

    /// Jobs not yet delivered, newest first
    fn unseen(&self, limit: Option<usize>) -> StoreResult<Vec<Job>>;

    /// Mark jobs as delivered, returning how many changed
    fn mark_notified(&self, fingerprints: &[Fingerprint]) -> StoreResult<usize>;

    /// Total stored jobs
    fn count(&self) -> StoreResult<usize>;

    /// Add a keyword or tag; returns false (and updates the weight) if
    /// it already existed
    fn add_term(&self, kind: TermKind, term: &SearchTerm) -> StoreResult<bool>;

    /// Remove a keyword or tag (case-insensitive)
    fn remove_term(&self, kind: TermKind, text: &str) -> StoreResult<bool>;

    /// List keywords or tags in insertion order
    fn list_terms(&self, kind: TermKind) -> StoreResult<Vec<SearchTerm>>;

    /// Append a run-log entry
    fn record_run(&self, record: &RunRecord) -> StoreResult<()>;

    /// Most recent runs, newest first
    fn recent_runs(&self, limit: usize) -> StoreResult<Vec<RunRecord>>;
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ============================================================================
// SQLite Implementation
// ============================================================================

const JOB_COLUMNS: &str = "fingerprint, source, title, company, location, url, description, \
                           posted_at, score, score_flagged, first_seen_at, notified";

/// SQLite implementation of JobRepository
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteJobRepository {
    conn: Mutex<Connection>,
}

impl SqliteJobRepository {
    /// Create a new SQLite repository
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite job repository initialized");
        Ok(repo)
    }

    /// Create in-memory repository (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;
        Ok(repo)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Create database schema
    fn create_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS jobs (
                    fingerprint TEXT PRIMARY KEY,
                    source TEXT NOT NULL,
                    title TEXT NOT NULL,
                    company TEXT NOT NULL,
                    location TEXT NOT NULL,
                    url TEXT NOT NULL,
                    description TEXT NOT NULL,
                    posted_at TEXT,
                    score INTEGER NOT NULL DEFAULT 0,
                    score_flagged INTEGER NOT NULL DEFAULT 0,
                    first_seen_at TEXT NOT NULL,
                    notified INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_jobs_unseen
                    ON jobs(notified, first_seen_at);

                CREATE TABLE IF NOT EXISTS search_terms (
                    kind TEXT NOT NULL,
                    term_key TEXT NOT NULL,
                    term TEXT NOT NULL,
                    weight REAL,
                    added_at TEXT NOT NULL,
                    PRIMARY KEY (kind, term_key)
                );

                CREATE TABLE IF NOT EXISTS run_log (
                    run_id TEXT PRIMARY KEY,
                    trigger_kind TEXT NOT NULL,
                    mode TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    finished_at TEXT NOT NULL,
                    new_jobs INTEGER NOT NULL,
                    duplicates INTEGER NOT NULL,
                    status TEXT NOT NULL
                );
                "#,
        )?;

        Ok(())
    }

    fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
        let posted_at = match row.get::<_, Option<String>>(7)? {
            Some(raw) => Some(parse_timestamp(7, &raw)?),
            None => None,
        };
        let score: i64 = row.get(8)?;

        Ok(Job {
            fingerprint: Fingerprint::from_hex(row.get::<_, String>(0)?),
            listing: RawListing {
                source: row.get(1)?,
                title: row.get(2)?,
                company: row.get(3)?,
                location: row.get(4)?,
                url: row.get(5)?,
                description: row.get(6)?,
                posted_at,
            },
            score: score.clamp(0, 100) as u8,
            score_flagged: row.get(9)?,
            first_seen_at: parse_timestamp(10, &row.get::<_, String>(10)?)?,
            notified: row.get(11)?,
        })
    }

    fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
        let new_jobs: i64 = row.get(5)?;
        let duplicates: i64 = row.get(6)?;

        Ok(RunRecord {
            run_id: row.get(0)?,
            trigger: row.get(1)?,
            mode: row.get(2)?,
            started_at: parse_timestamp(3, &row.get::<_, String>(3)?)?,
            finished_at: parse_timestamp(4, &row.get::<_, String>(4)?)?,
            new_jobs: new_jobs.max(0) as usize,
            duplicates: duplicates.max(0) as usize,
            status: row.get(7)?,
        })
    }
}

impl JobRepository for SqliteJobRepository {
    fn admit(
        &self,
        listings: &[RawListing],
        seen_at: DateTime<Utc>,
        score: &ScoreFn<'_>,
    ) -> StoreResult<Admission> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let seen = timestamp(&seen_at);
        let mut admission = Admission::default();

        {
            let mut exists =
                tx.prepare_cached("SELECT EXISTS(SELECT 1 FROM jobs WHERE fingerprint = ?1)")?;
            let mut insert = tx.prepare_cached(
                r#"
                    INSERT INTO jobs
                        (fingerprint, source, title, company, location, url, description,
                         posted_at, score, score_flagged, first_seen_at, notified)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0)
                    "#,
            )?;

            for listing in listings {
                let fingerprint = listing.fingerprint();
                let known: bool =
                    exists.query_row(params![fingerprint.as_str()], |row| row.get(0))?;
                if known {
                    admission.duplicates += 1;
                    continue;
                }

                let job = Job::discovered(listing.clone(), seen_at).with_score(score(listing));
                insert.execute(params![
                    job.fingerprint.as_str(),
                    listing.source,
                    listing.title,
                    listing.company,
                    listing.location,
                    listing.url,
                    listing.description,
                    listing.posted_at.as_ref().map(timestamp),
                    job.score,
                    job.score_flagged,
                    seen,
                ])?;
                admission.new_jobs.push(job);
            }
        }

        tx.commit()?;
        Ok(admission)
    }

    fn contains(&self, fingerprint: &Fingerprint) -> StoreResult<bool> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM jobs WHERE fingerprint = ?1)",
            params![fingerprint.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn get(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Job>> {
        let conn = self.lock()?;
        let job = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE fingerprint = ?1"),
                params![fingerprint.as_str()],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn unseen(&self, limit: Option<usize>) -> StoreResult<Vec<Job>> {
        let conn = self.lock()?;
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE notified = 0
             ORDER BY first_seen_at DESC, score DESC, fingerprint ASC
             LIMIT ?1"
        ))?;

        let jobs = stmt
            .query_map(params![limit], Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn mark_notified(&self, fingerprints: &[Fingerprint]) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE jobs SET notified = 1 WHERE fingerprint = ?1 AND notified = 0",
            )?;
            for fingerprint in fingerprints {
                changed += stmt.execute(params![fingerprint.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    fn count(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?;
        Ok(total as usize)
    }

    fn add_term(&self, kind: TermKind, term: &SearchTerm) -> StoreResult<bool> {
        let conn = self.lock()?;
        let key = fold(&term.text);
        let existed: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM search_terms WHERE kind = ?1 AND term_key = ?2)",
            params![kind.as_str(), key],
            |row| row.get(0),
        )?;

        conn.execute(
            r#"
                INSERT INTO search_terms (kind, term_key, term, weight, added_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(kind, term_key) DO UPDATE SET
                    weight = excluded.weight
                "#,
            params![
                kind.as_str(),
                key,
                term.text.trim(),
                term.weight,
                timestamp(&Utc::now())
            ],
        )?;

        Ok(!existed)
    }

    fn remove_term(&self, kind: TermKind, text: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM search_terms WHERE kind = ?1 AND term_key = ?2",
            params![kind.as_str(), fold(text)],
        )?;
        Ok(removed > 0)
    }

    fn list_terms(&self, kind: TermKind) -> StoreResult<Vec<SearchTerm>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT term, weight FROM search_terms WHERE kind = ?1 ORDER BY rowid")?;
        let terms = stmt
            .query_map(params![kind.as_str()], |row| {
                Ok(SearchTerm {
                    text: row.get(0)?,
                    weight: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(terms)
    }

    fn record_run(&self, record: &RunRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
                INSERT OR REPLACE INTO run_log
                    (run_id, trigger_kind, mode, started_at, finished_at, new_jobs, duplicates, status)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            params![
                record.run_id,
                record.trigger,
                record.mode,
                timestamp(&record.started_at),
                timestamp(&record.finished_at),
                record.new_jobs as i64,
                record.duplicates as i64,
                record.status,
            ],
        )?;
        Ok(())
    }

    fn recent_runs(&self, limit: usize) -> StoreResult<Vec<RunRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, trigger_kind, mode, started_at, finished_at, new_jobs, duplicates, status
             FROM run_log ORDER BY started_at DESC LIMIT ?1",
        )?;
        let runs = stmt
            .query_map(params![limit as i64], Self::row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }
}

// ============================================================================
// Mock Implementation (for testing)
// ============================================================================

/// In-memory mock implementation of JobRepository
///
/// Useful for testing without database dependencies.
pub struct MockJobRepository {
    jobs: RwLock<HashMap<Fingerprint, Job>>,
    terms: RwLock<Vec<(TermKind, SearchTerm)>>,
    runs: RwLock<Vec<RunRecord>>,
}

impl MockJobRepository {
    /// Create a new mock repository
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            terms: RwLock::new(Vec::new()),
            runs: RwLock::new(Vec::new()),
        }
    }

    /// Get the number of stored jobs
    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MockJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::LockPoisoned
}

impl JobRepository for MockJobRepository {
    fn admit(
        &self,
        listings: &[RawListing],
        seen_at: DateTime<Utc>,
        score: &ScoreFn<'_>,
    ) -> StoreResult<Admission> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let mut admission = Admission::default();

        for listing in listings {
            let fingerprint = listing.fingerprint();
            if jobs.contains_key(&fingerprint) {
                admission.duplicates += 1;
                continue;
            }
            let job = Job::discovered(listing.clone(), seen_at).with_score(score(listing));
            jobs.insert(fingerprint, job.clone());
            admission.new_jobs.push(job);
        }

        Ok(admission)
    }

    fn contains(&self, fingerprint: &Fingerprint) -> StoreResult<bool> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.contains_key(fingerprint))
    }

    fn get(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Job>> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.get(fingerprint).cloned())
    }

    fn unseen(&self, limit: Option<usize>) -> StoreResult<Vec<Job>> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut unseen: Vec<Job> = jobs.values().filter(|j| !j.notified).cloned().collect();
        unseen.sort_by(|a, b| {
            b.first_seen_at
                .cmp(&a.first_seen_at)
                .then(b.score.cmp(&a.score))
                .then(a.fingerprint.cmp(&b.fingerprint))
        });
        if let Some(limit) = limit {
            unseen.truncate(limit);
        }
        Ok(unseen)
    }

    fn mark_notified(&self, fingerprints: &[Fingerprint]) -> StoreResult<usize> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let mut changed = 0;
        for fingerprint in fingerprints {
            if let Some(job) = jobs.get_mut(fingerprint) {
                if !job.notified {
                    job.notified = true;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    fn count(&self) -> StoreResult<usize> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.len())
    }

    fn add_term(&self, kind: TermKind, term: &SearchTerm) -> StoreResult<bool> {
        let mut terms = self.terms.write().map_err(poisoned)?;
        let key = fold(&term.text);

        if let Some((_, existing)) = terms
            .iter_mut()
            .find(|(k, t)| *k == kind && fold(&t.text) == key)
        {
            existing.weight = term.weight;
            return Ok(false);
        }

        terms.push((kind, SearchTerm {
            text: term.text.trim().to_string(),
            weight: term.weight,
        }));
        Ok(true)
    }

    fn remove_term(&self, kind: TermKind, text: &str) -> StoreResult<bool> {
        let mut terms = self.terms.write().map_err(poisoned)?;
        let key = fold(text);
        let before = terms.len();
        terms.retain(|(k, t)| !(*k == kind && fold(&t.text) == key));
        Ok(terms.len() != before)
    }

    fn list_terms(&self, kind: TermKind) -> StoreResult<Vec<SearchTerm>> {
        let terms = self.terms.read().map_err(poisoned)?;
        Ok(terms
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, t)| t.clone())
            .collect())
    }

    fn record_run(&self, record: &RunRecord) -> StoreResult<()> {
        let mut runs = self.runs.write().map_err(poisoned)?;
        runs.retain(|r| r.run_id != record.run_id);
        runs.push(record.clone());
        Ok(())
    }

    fn recent_runs(&self, limit: usize) -> StoreResult<Vec<RunRecord>> {
        let runs = self.runs.read().map_err(poisoned)?;
        let mut recent = runs.clone();
        recent.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        recent.truncate(limit);
        Ok(recent)
    }
}

// ============================================================================
// Shared Repository Types
// ============================================================================

/// Thread-safe shared repository wrapper
pub type SharedJobRepository = Arc<dyn JobRepository>;

/// Create a shared SQLite repository
pub fn create_sqlite_repository(path: impl AsRef<Path>) -> StoreResult<SharedJobRepository> {
    let repo = SqliteJobRepository::new(path)?;
    Ok(Arc::new(repo))
}

/// Create a shared mock repository
pub fn create_mock_repository() -> SharedJobRepository {
    Arc::new(MockJobRepository::new())
}

// ============================================================================
// Tests
// ============================================================================
