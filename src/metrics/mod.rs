//! Prometheus metrics for the jobscout pipeline
//!
//! This module provides metrics tracking for:
//! - Runs: status, duration, new/duplicate job counts, dropped triggers
//! - Sources: abandoned searches and skips per source
//! - Delivery: notification outcomes per channel
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all pipeline metrics
struct ScoutMetrics {
    runs: CounterVec,
    run_duration: HistogramVec,
    last_run_duration: Gauge,
    is_running: Gauge,
    new_jobs: Counter,
    duplicates: Counter,
    dropped_triggers: Counter,
    source_failures: CounterVec,
    source_skips: CounterVec,
    deliveries: CounterVec,
}

/// Global storage for pipeline metrics
static SCOUT_METRICS: OnceLock<ScoutMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged and subsequent
/// metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = jobscout::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = ScoutMetrics {
        runs: register_counter_vec!(
            "jobscout_runs_total",
            "Total pipeline runs by trigger and status",
            &["trigger", "status"]
        )?,
        run_duration: register_histogram_vec!(
            "jobscout_run_duration_seconds",
            "Pipeline run duration in seconds",
            &["trigger"],
            vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]
        )?,
        last_run_duration: register_gauge!(
            "jobscout_last_run_duration_seconds",
            "Duration of the most recent run in seconds"
        )?,
        is_running: register_gauge!(
            "jobscout_run_in_progress",
            "Whether a run is currently executing (1 = yes, 0 = no)"
        )?,
        new_jobs: register_counter!(
            "jobscout_new_jobs_total",
            "Total listings admitted as new jobs"
        )?,
        duplicates: register_counter!(
            "jobscout_duplicates_total",
            "Total listings rejected as already seen"
        )?,
        dropped_triggers: register_counter!(
            "jobscout_dropped_triggers_total",
            "Triggers dropped because a run was already in progress"
        )?,
        source_failures: register_counter_vec!(
            "jobscout_source_failures_total",
            "Searches abandoned after retries, by source",
            &["source"]
        )?,
        source_skips: register_counter_vec!(
            "jobscout_source_skips_total",
            "Sources skipped for a run, by source and reason",
            &["source", "reason"]
        )?,
        deliveries: register_counter_vec!(
            "jobscout_deliveries_total",
            "Notification deliveries by channel and outcome",
            &["channel", "outcome"]
        )?,
    };

    SCOUT_METRICS
        .set(metrics)
        .map_err(|_| "Pipeline metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SCOUT_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a run timer (returns a timer handle)
pub fn start_run_timer(trigger: &str) -> MetricsTimer {
    match SCOUT_METRICS.get() {
        Some(m) => MetricsTimer::new(m.run_duration.with_label_values(&[trigger]).start_timer()),
        None => MetricsTimer::noop(),
    }
}

/// Record a finished run
pub fn record_run(trigger: &str, status: &str, duration_secs: f64) {
    let Some(m) = SCOUT_METRICS.get() else {
        return;
    };

    m.runs.with_label_values(&[trigger, status]).inc();
    m.last_run_duration.set(duration_secs);
}

/// Update run-in-progress state
pub fn set_run_in_progress(running: bool) {
    if let Some(m) = SCOUT_METRICS.get() {
        m.is_running.set(if running { 1.0 } else { 0.0 });
    }
}

/// Record deduplication results
pub fn record_dedup_results(new_jobs: usize, duplicates: usize) {
    let Some(m) = SCOUT_METRICS.get() else {
        return;
    };

    if new_jobs > 0 {
        m.new_jobs.inc_by(new_jobs as f64);
    }
    if duplicates > 0 {
        m.duplicates.inc_by(duplicates as f64);
    }
}

/// Record a trigger dropped by the single-flight guard
pub fn record_dropped_trigger() {
    if let Some(m) = SCOUT_METRICS.get() {
        m.dropped_triggers.inc();
    }
}

/// Record a search abandoned after retries
pub fn record_source_failure(source: &str) {
    if let Some(m) = SCOUT_METRICS.get() {
        m.source_failures.with_label_values(&[source]).inc();
    }
}

/// Record a source skipped for a run
pub fn record_source_skip(source: &str, reason: &str) {
    if let Some(m) = SCOUT_METRICS.get() {
        m.source_skips.with_label_values(&[source, reason]).inc();
    }
}

/// Record a notification delivery
pub fn record_delivery(channel: &str, success: bool) {
    let Some(m) = SCOUT_METRICS.get() else {
        return;
    };

    let outcome = if success { "success" } else { "failure" };
    m.deliveries.with_label_values(&[channel, outcome]).inc();
}

// ============================================================================
// Tests
// ============================================================================
