//! Integration tests module
//!
//! End-to-end tests for the jobscout pipeline, including:
//! - Complete collect → dedup → score → store runs
//! - JSON feed sources, robots.txt gating and webhook delivery over HTTP
//! - Error handling and recovery scenarios

pub mod error_scenarios;
pub mod feed_test;
pub mod fixtures;
pub mod pipeline_test;
