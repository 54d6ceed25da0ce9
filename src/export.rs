//! Export of stored jobs
//!
//! The [`Exporter`] trait is the boundary to whatever renders jobs outside
//! the pipeline. [`JsonLinesExporter`] appends one JSON object per job to a
//! file, which makes repeated exports cheap to tail and to re-import.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::Job;

/// Errors raised while exporting
#[derive(Error, Debug)]
pub enum ExportError {
    /// Destination could not be created or written
    #[error("Export I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A job could not be serialized
    #[error("Export serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Renders jobs to an external destination
pub trait Exporter: Send + Sync {
    /// Export `jobs`, returning how many were written
    fn export(&self, jobs: &[Job]) -> Result<usize, ExportError>;
}

/// Flat per-job record written by the exporters
#[derive(Debug, Serialize)]
pub struct ExportRecord<'a> {
    pub fingerprint: &'a str,
    pub source: &'a str,
    pub title: &'a str,
    pub company: &'a str,
    pub location: &'a str,
    pub url: &'a str,
    pub score: u8,
    pub score_flagged: bool,
    pub posted_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
}

impl<'a> From<&'a Job> for ExportRecord<'a> {
    fn from(job: &'a Job) -> Self {
        Self {
            fingerprint: job.fingerprint.as_str(),
            source: &job.listing.source,
            title: &job.listing.title,
            company: &job.listing.company,
            location: &job.listing.location,
            url: &job.listing.url,
            score: job.score,
            score_flagged: job.score_flagged,
            posted_at: job.listing.posted_at,
            first_seen_at: job.first_seen_at,
        }
    }
}

/// Write jobs as JSON lines to any writer
pub fn write_json_lines<W: Write>(jobs: &[Job], writer: &mut W) -> Result<(), std::io::Error> {
    for job in jobs {
        serde_json::to_writer(&mut *writer, &ExportRecord::from(job))?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Appends jobs to a JSON-lines file
#[derive(Debug, Clone)]
pub struct JsonLinesExporter {
    path: PathBuf,
}

impl JsonLinesExporter {
    /// Exporter appending to `path`; parent directories are created on
    /// first export
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ExportError {
        ExportError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Exporter for JsonLinesExporter {
    fn export(&self, jobs: &[Job]) -> Result<usize, ExportError> {
        if jobs.is_empty() {
            return Ok(0);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        let mut writer = BufWriter::new(file);
        write_json_lines(jobs, &mut writer).map_err(|e| self.io_error(e))?;

        tracing::debug!(path = %self.path.display(), jobs = jobs.len(), "Exported jobs");
        Ok(jobs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawListing;
    use tempfile::TempDir;

    fn job(title: &str) -> Job {
        let listing = RawListing::new("board", title, "Acme", format!("https://acme.test/{title}"))
            .with_location("Remote");
        Job::discovered(listing, Utc::now())
    }

    #[test]
    fn test_export_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("jobs.jsonl");
        let exporter = JsonLinesExporter::new(&path);

        assert_eq!(exporter.export(&[job("a"), job("b")]).unwrap(), 2);
        assert_eq!(exporter.export(&[job("c")]).unwrap(), 1);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["title"], "a");
        assert_eq!(first["location"], "Remote");
        assert_eq!(first["fingerprint"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_export_nothing_creates_no_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.jsonl");
        assert_eq!(JsonLinesExporter::new(&path).export(&[]).unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_write_json_lines_to_buffer() {
        let mut buf = Vec::new();
        write_json_lines(&[job("x")], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("\"score\":0"));
    }
}
