//! Relevance scoring for newly discovered listings
//!
//! The score is a pure function of the listing and the run's
//! [`ScoringProfile`], built from independent additive contributions:
//!
//! | Contribution | Points |
//! |--------------|--------|
//! | Best keyword | +40 phrase in title, +5 per keyword word in title, x weight |
//! | Each tag     | +10 x weight in title, else +3 x weight in description |
//! | Location     | +10 when the remote/location constraint matches |
//! | Experience   | +10 when the title carries a marker of the level |
//!
//! The sum is rounded and clamped to `[0, 100]`.

use serde::{Deserialize, Serialize};

use crate::models::{ExperienceLevel, RawListing, SearchTerm};
use crate::utils::error::ScoringError;
use crate::utils::fold;

// ============================================================================
// Profile
// ============================================================================

/// Active search configuration for one run
///
/// Snapshotted at run start and read-only while the run executes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringProfile {
    pub keywords: Vec<SearchTerm>,
    pub tags: Vec<SearchTerm>,
    pub locations: Vec<String>,
    pub remote_filter: bool,
    pub experience_level: Option<ExperienceLevel>,
}

impl ScoringProfile {
    pub fn new(keywords: Vec<SearchTerm>) -> Self {
        Self {
            keywords,
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: Vec<SearchTerm>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_locations(mut self, locations: Vec<String>) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_remote_filter(mut self, remote: bool) -> Self {
        self.remote_filter = remote;
        self
    }

    pub fn with_experience_level(mut self, level: Option<ExperienceLevel>) -> Self {
        self.experience_level = level;
        self
    }
}

/// Point values for each contribution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub keyword_phrase: f64,
    pub keyword_word: f64,
    pub tag_in_title: f64,
    pub tag_in_description: f64,
    pub location_bonus: f64,
    pub experience_bonus: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            keyword_phrase: 40.0,
            keyword_word: 5.0,
            tag_in_title: 10.0,
            tag_in_description: 3.0,
            location_bonus: 10.0,
            experience_bonus: 10.0,
        }
    }
}

/// Per-contribution view of a score, for `--verbose` listings and tests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub keyword: f64,
    pub tags: f64,
    pub location: f64,
    pub experience: f64,
}

impl ScoreBreakdown {
    pub fn raw_total(&self) -> f64 {
        self.keyword + self.tags + self.location + self.experience
    }

    /// Final clamped score
    pub fn total(&self) -> u8 {
        let total = self.raw_total().round();
        if total.is_nan() {
            return 0;
        }
        total.clamp(0.0, 100.0) as u8
    }
}

// ============================================================================
// Scorer
// ============================================================================

/// Stateless relevance scorer
#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    weights: ScoreWeights,
}

impl RelevanceScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    /// Score a listing in `[0, 100]`
    pub fn score(
        &self,
        listing: &RawListing,
        profile: &ScoringProfile,
    ) -> Result<u8, ScoringError> {
        self.explain(listing, profile).map(|b| b.total())
    }

    /// Compute every contribution separately
    pub fn explain(
        &self,
        listing: &RawListing,
        profile: &ScoringProfile,
    ) -> Result<ScoreBreakdown, ScoringError> {
        let title = fold(&listing.title);
        if title.is_empty() {
            return Err(ScoringError::EmptyTitle);
        }
        for term in profile.keywords.iter().chain(&profile.tags) {
            check_weight(term)?;
        }

        let description = fold(&listing.description);
        let location = fold(&listing.location);

        Ok(ScoreBreakdown {
            keyword: self.keyword_contribution(&title, &profile.keywords),
            tags: self.tag_contribution(&title, &description, &profile.tags),
            location: self.location_contribution(&title, &location, profile),
            experience: self.experience_contribution(&title, profile.experience_level),
        })
    }

    fn keyword_contribution(&self, title: &str, keywords: &[SearchTerm]) -> f64 {
        keywords
            .iter()
            .map(|term| {
                let phrase = fold(&term.text);
                if phrase.is_empty() {
                    return 0.0;
                }

                let mut points = 0.0;
                if title.contains(&phrase) {
                    points += self.weights.keyword_phrase;
                }
                for word in phrase.split(' ').filter(|w| w.chars().count() >= 2) {
                    if title.contains(word) {
                        points += self.weights.keyword_word;
                    }
                }
                points * term.effective_weight()
            })
            .fold(0.0, f64::max)
    }

    fn tag_contribution(&self, title: &str, description: &str, tags: &[SearchTerm]) -> f64 {
        tags.iter()
            .map(|tag| {
                let needle = fold(&tag.text);
                if needle.is_empty() {
                    0.0
                } else if title.contains(&needle) {
                    self.weights.tag_in_title * tag.effective_weight()
                } else if description.contains(&needle) {
                    self.weights.tag_in_description * tag.effective_weight()
                } else {
                    0.0
                }
            })
            .sum()
    }

    fn location_contribution(&self, title: &str, location: &str, profile: &ScoringProfile) -> f64 {
        let matched = if profile.remote_filter {
            location.contains("remote") || title.contains("remote")
        } else {
            profile
                .locations
                .iter()
                .map(|l| fold(l))
                .any(|l| !l.is_empty() && location.contains(&l))
        };

        if matched {
            self.weights.location_bonus
        } else {
            0.0
        }
    }

    fn experience_contribution(&self, title: &str, level: Option<ExperienceLevel>) -> f64 {
        match level {
            Some(level) if level.markers().iter().any(|m| title.contains(m)) => {
                self.weights.experience_bonus
            }
            _ => 0.0,
        }
    }
}

fn check_weight(term: &SearchTerm) -> Result<(), ScoringError> {
    match term.weight {
        Some(w) if !w.is_finite() || w < 0.0 => Err(ScoringError::InvalidWeight {
            term: term.text.clone(),
            weight: w,
        }),
        _ => Ok(()),
    }
}
