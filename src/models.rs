// Core data structures for the jobscout pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::storage::dedup::Fingerprint;

/// Unprocessed listing as returned by a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawListing {
    pub source: String, // Registry name of the producing source
    pub title: String,
    pub company: String,
    pub location: String,
    pub url: String,
    pub description: String,
    pub posted_at: Option<DateTime<Utc>>,
}

impl RawListing {
    /// Create a listing with the identity fields set
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        company: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            company: company.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_posted_at(mut self, posted_at: DateTime<Utc>) -> Self {
        self.posted_at = Some(posted_at);
        self
    }

    /// Identity key of this listing
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

/// A listing that has been admitted by the dedup store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub fingerprint: Fingerprint,
    pub listing: RawListing,
    pub score: u8,            // 0-100
    pub score_flagged: bool,  // Scoring failed, score forced to 0
    pub first_seen_at: DateTime<Utc>,
    pub notified: bool,
}

impl Job {
    /// Build a freshly discovered, not yet scored job
    pub fn discovered(listing: RawListing, first_seen_at: DateTime<Utc>) -> Self {
        Self {
            fingerprint: listing.fingerprint(),
            listing,
            score: 0,
            score_flagged: false,
            first_seen_at,
            notified: false,
        }
    }

    /// Attach the score computed at first sight
    pub fn with_score(mut self, score: JobScore) -> Self {
        self.score = score.score;
        self.score_flagged = score.flagged;
        self
    }

    pub fn title(&self) -> &str {
        &self.listing.title
    }

    pub fn source(&self) -> &str {
        &self.listing.source
    }
}

/// Score assigned to a job by the relevance scorer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobScore {
    pub score: u8,
    pub flagged: bool,
}

impl JobScore {
    /// Score 0, flagged: the scorer rejected the listing
    pub const FLAGGED: Self = Self {
        score: 0,
        flagged: true,
    };
}

/// Whether a search term is a keyword or a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermKind {
    Keyword,
    Tag,
}

impl TermKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Tag => "tag",
        }
    }
}

impl FromStr for TermKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyword" => Ok(Self::Keyword),
            "tag" => Ok(Self::Tag),
            other => Err(format!("unknown term kind: {other}")),
        }
    }
}

/// Keyword or tag with an optional weight
///
/// Deserializes from either a bare string or `{ text, weight }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TermRepr", into = "TermRepr")]
pub struct SearchTerm {
    pub text: String,
    pub weight: Option<f64>,
}

impl SearchTerm {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            weight: None,
        }
    }

    pub fn weighted(text: impl Into<String>, weight: f64) -> Self {
        Self {
            text: text.into(),
            weight: Some(weight),
        }
    }

    /// Weight to apply when scoring (defaults to 1.0)
    pub fn effective_weight(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TermRepr {
    Plain(String),
    Weighted { text: String, weight: Option<f64> },
}

impl From<TermRepr> for SearchTerm {
    fn from(repr: TermRepr) -> Self {
        match repr {
            TermRepr::Plain(text) => Self::new(text),
            TermRepr::Weighted { text, weight } => Self { text, weight },
        }
    }
}

impl From<SearchTerm> for TermRepr {
    fn from(term: SearchTerm) -> Self {
        match term.weight {
            None => TermRepr::Plain(term.text),
            Some(weight) => TermRepr::Weighted {
                text: term.text,
                weight: Some(weight),
            },
        }
    }
}

/// Seniority filter applied by the scorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Internship,
    Entry,
    Mid,
    Senior,
    Lead,
}

impl ExperienceLevel {
    /// Lower-case title markers that indicate this level
    pub fn markers(&self) -> &'static [&'static str] {
        match self {
            Self::Internship => &["intern"],
            Self::Entry => &["entry", "junior", "new grad", "graduate"],
            Self::Mid => &["mid-level", "mid level", "intermediate"],
            Self::Senior => &["senior", "sr."],
            Self::Lead => &["lead", "principal", "staff"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internship => "internship",
            Self::Entry => "entry",
            Self::Mid => "mid",
            Self::Senior => "senior",
            Self::Lead => "lead",
        }
    }
}

impl FromStr for ExperienceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "internship" | "intern" => Ok(Self::Internship),
            "entry" | "junior" => Ok(Self::Entry),
            "mid" => Ok(Self::Mid),
            "senior" => Ok(Self::Senior),
            "lead" => Ok(Self::Lead),
            other => Err(format!("unknown experience level: {other}")),
        }
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a source contributed nothing to a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// robots.txt forbids the source's search endpoint
    RobotsDisallowed,
    /// The run deadline expired before the source finished
    DeadlineExceeded,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RobotsDisallowed => "robots_disallowed",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-source breakdown for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub source: String,
    pub successes: u32, // (keyword, location) searches that returned
    pub failures: u32,  // searches abandoned after backoff
    pub listings: usize,
    pub skip: Option<SkipReason>,
    pub last_error: Option<String>,
}

impl SourceOutcome {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            successes: 0,
            failures: 0,
            listings: 0,
            skip: None,
            last_error: None,
        }
    }

    /// Source neither failed nor was skipped
    pub fn is_clean(&self) -> bool {
        self.failures == 0 && self.skip.is_none()
    }
}

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}

/// Whether dispatch happens after the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Live,
    Dry, // persist and score, skip dispatch
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Dry => "dry",
        }
    }
}

/// Outcome of one pipeline execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub trigger: TriggerKind,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub new_jobs: Vec<Job>,
    pub duplicates: usize,
    pub outcomes: Vec<SourceOutcome>,
    pub partial: bool, // deadline hit, results are incomplete
}

impl RunResult {
    pub fn outcome(&self, source: &str) -> Option<&SourceOutcome> {
        self.outcomes.iter().find(|o| o.source == source)
    }

    pub fn total_failures(&self) -> u32 {
        self.outcomes.iter().map(|o| o.failures).sum()
    }

    pub fn skipped_sources(&self) -> usize {
        self.outcomes.iter().filter(|o| o.skip.is_some()).count()
    }

    /// Run duration in milliseconds
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Persisted run-log row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub trigger: String,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub new_jobs: usize,
    pub duplicates: usize,
    pub status: String, // "ok", "partial" or "failed"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_term_deserialize_plain_and_weighted() {
        #[derive(Deserialize)]
        struct Wrapper {
            terms: Vec<SearchTerm>,
        }

        let parsed: Wrapper =
            toml::from_str(r#"terms = ["ML Engineer", { text = "Rust", weight = 2.5 }]"#).unwrap();

        assert_eq!(parsed.terms[0], SearchTerm::new("ML Engineer"));
        assert_eq!(parsed.terms[1], SearchTerm::weighted("Rust", 2.5));
        assert_eq!(parsed.terms[0].effective_weight(), 1.0);
    }

    #[test]
    fn test_experience_level_parse() {
        assert_eq!("Senior".parse::<ExperienceLevel>(), Ok(ExperienceLevel::Senior));
        assert_eq!("intern".parse::<ExperienceLevel>(), Ok(ExperienceLevel::Internship));
        assert!("wizard".parse::<ExperienceLevel>().is_err());
    }

    #[test]
    fn test_skip_reason_labels() {
        assert_eq!(SkipReason::RobotsDisallowed.as_str(), "robots_disallowed");
        assert_eq!(SkipReason::DeadlineExceeded.to_string(), "deadline_exceeded");
    }

    #[test]
    fn test_job_discovered_defaults() {
        let listing = RawListing::new("feed", "Rust Engineer", "Acme", "https://acme.test/1");
        let job = Job::discovered(listing.clone(), Utc::now());

        assert_eq!(job.fingerprint, listing.fingerprint());
        assert_eq!(job.score, 0);
        assert!(!job.notified);
        assert!(!job.score_flagged);

        let flagged = job.with_score(JobScore::FLAGGED);
        assert_eq!(flagged.score, 0);
        assert!(flagged.score_flagged);
    }

    #[test]
    fn test_source_outcome_clean() {
        let mut outcome = SourceOutcome::new("feed");
        assert!(outcome.is_clean());
        outcome.failures = 1;
        assert!(!outcome.is_clean());
    }
}
