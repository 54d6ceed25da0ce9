//! Persistence for discovered jobs
//!
//! - [`repository`]: trait-based job/term/run-log tables (SQLite + mock)
//! - [`dedup`]: listing fingerprints and the async dedup facade

pub mod dedup;
pub mod repository;

pub use dedup::{normalize_url, DedupStore, Fingerprint};
pub use repository::{
    create_mock_repository, create_sqlite_repository, Admission, JobRepository,
    MockJobRepository, ScoreFn, SharedJobRepository, SqliteJobRepository,
};
