//! Periodic, single-flight driver of the pipeline
//!
//! # Overview
//!
//! The [`Scheduler`] owns the [`RunPipeline`] and the post-run hand-off
//! (notification dispatch and export). Every entry point (the interval
//! loop, [`Scheduler::run_once`], [`Scheduler::dry_run`]) goes through
//! [`Scheduler::trigger`], so scheduled and manual runs behave the same.
//!
//! # Single-flight
//!
//! A run claims the [`RunSlot`] before doing anything. A trigger arriving
//! while the slot is taken is dropped: it returns
//! [`SchedulerError::RunInProgress`], is logged at `warn`, counted in the
//! `jobscout_dropped_triggers_total` metric and broadcast as
//! [`SchedulerEvent::TriggerDropped`]. Interval ticks missed during a long
//! run are skipped, not replayed.
//!
//! # Architecture
//!
//! ```text
//!   interval tick ──┐
//!   run_once() ─────┼──▶ RunSlot ──▶ RunPipeline ──▶ RunResult
//!   dry_run() ──────┘   (drop if                        │
//!                        busy)              ┌───────────┴──────────┐
//!                                           ▼                      ▼
//!                                      Exporter          NotificationManager
//!                                                        (new + undelivered,
//!                                                         mark notified)
//! ```
//!
//! # Delivery
//!
//! A live run's digest carries its new jobs plus every job earlier runs
//! failed to deliver. All of them are marked notified once at least one
//! channel accepts the digest.
//!
//! # Example
//!
//! ```ignore
//! use jobscout::scheduler::Scheduler;
//!
//! let scheduler = Scheduler::new(pipeline, config.scheduler.clone())
//!     .with_notifier(manager);
//!
//! let mut events = scheduler.subscribe();
//! let handle = tokio::spawn({
//!     let scheduler = scheduler.clone();
//!     async move { scheduler.start().await }
//! });
//!
//! tokio::signal::ctrl_c().await?;
//! scheduler.stop();
//! handle.await??;
//! ```

pub mod error;
pub mod trigger;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::{Error, ScoutErrorTrait};
use crate::export::Exporter;
use crate::metrics;
use crate::models::{Job, RunMode, RunResult, TriggerKind};
use crate::notifications::NotificationManager;
use crate::pipeline::RunPipeline;
use crate::storage::Fingerprint;

// Re-export main types
pub use error::{SchedulerError, SchedulerResult};
pub use trigger::{RunGuard, RunSlot, SchedulerEvent};

/// Capacity of the event broadcast channel
const EVENT_CAPACITY: usize = 64;

struct SchedulerInner {
    pipeline: RunPipeline,
    notifier: NotificationManager,
    exporter: Option<Arc<dyn Exporter>>,
    config: SchedulerConfig,
    slot: RunSlot,
    events: broadcast::Sender<SchedulerEvent>,
    shutdown: watch::Sender<bool>,
    loop_running: AtomicBool,
}

/// Cloneable handle to the run driver
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

/// Builder-style construction for [`Scheduler`]
pub struct SchedulerBuilder {
    pipeline: RunPipeline,
    config: SchedulerConfig,
    notifier: NotificationManager,
    exporter: Option<Arc<dyn Exporter>>,
}

impl SchedulerBuilder {
    /// Channels receiving the digest of live runs
    pub fn with_notifier(mut self, notifier: NotificationManager) -> Self {
        self.notifier = notifier;
        self
    }

    /// Exporter receiving the new jobs of live runs
    pub fn with_exporter(mut self, exporter: Arc<dyn Exporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn build(self) -> Scheduler {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);

        Scheduler {
            inner: Arc::new(SchedulerInner {
                pipeline: self.pipeline,
                notifier: self.notifier,
                exporter: self.exporter,
                config: self.config,
                slot: RunSlot::new(),
                events,
                shutdown,
                loop_running: AtomicBool::new(false),
            }),
        }
    }
}

impl Scheduler {
    /// Start building a scheduler around `pipeline`
    pub fn builder(pipeline: RunPipeline, config: SchedulerConfig) -> SchedulerBuilder {
        SchedulerBuilder {
            pipeline,
            config,
            notifier: NotificationManager::new(),
            exporter: None,
        }
    }

    /// Scheduler without channels or exporter
    pub fn new(pipeline: RunPipeline, config: SchedulerConfig) -> Self {
        Self::builder(pipeline, config).build()
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    pub fn pipeline(&self) -> &RunPipeline {
        &self.inner.pipeline
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Run currently executing, if any
    pub fn active_run(&self) -> Option<Uuid> {
        self.inner.slot.active()
    }

    /// Whether the periodic loop is running
    pub fn is_started(&self) -> bool {
        self.inner.loop_running.load(Ordering::SeqCst)
    }

    fn emit(&self, event: SchedulerEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    // ========================================================================
    // One-shot entry points
    // ========================================================================

    /// Manual live run
    pub async fn run_once(&self) -> SchedulerResult<RunResult> {
        self.trigger(TriggerKind::Manual, RunMode::Live).await
    }

    /// Manual run that persists and scores but never dispatches
    pub async fn dry_run(&self) -> SchedulerResult<RunResult> {
        self.trigger(TriggerKind::Manual, RunMode::Dry).await
    }

    /// Execute one run unless another is in progress
    pub async fn trigger(&self, kind: TriggerKind, mode: RunMode) -> SchedulerResult<RunResult> {
        let run_id = Uuid::new_v4();
        let guard = match self.inner.slot.try_acquire(run_id) {
            Ok(guard) => guard,
            Err(SchedulerError::RunInProgress { active_run }) => {
                tracing::warn!(
                    trigger = kind.as_str(),
                    active_run = %active_run,
                    "Run already in progress, dropping trigger"
                );
                metrics::record_dropped_trigger();
                self.emit(SchedulerEvent::TriggerDropped {
                    trigger: kind,
                    active_run,
                });
                return Err(SchedulerError::run_in_progress(active_run));
            }
            Err(e) => return Err(e),
        };

        self.emit(SchedulerEvent::RunStarted {
            run_id,
            trigger: kind,
            mode,
            started_at: Utc::now(),
        });
        let _timer = metrics::start_run_timer(kind.as_str());

        let result = match self.inner.pipeline.execute(run_id, kind, mode).await {
            Ok(result) => result,
            Err(e) => {
                self.emit(SchedulerEvent::RunFailed {
                    run_id,
                    reason: e.to_string(),
                });
                return Err(SchedulerError::run_failed(run_id, e));
            }
        };

        self.hand_off(&result).await;

        self.emit(SchedulerEvent::RunCompleted {
            run_id,
            new_jobs: result.new_jobs.len(),
            duplicates: result.duplicates,
            partial: result.partial,
        });

        drop(guard);
        Ok(result)
    }

    /// Pass a finished run to the exporter and notification channels
    async fn hand_off(&self, result: &RunResult) {
        let run_id = result.run_id;

        if result.mode == RunMode::Dry {
            tracing::info!(run_id = %run_id, "Dry run, dispatch suppressed");
            self.emit(SchedulerEvent::DispatchSuppressed { run_id });
            return;
        }

        if let Some(exporter) = &self.inner.exporter {
            let exporter = Arc::clone(exporter);
            let jobs = result.new_jobs.clone();
            match tokio::task::spawn_blocking(move || exporter.export(&jobs)).await {
                Ok(Ok(written)) => tracing::debug!(run_id = %run_id, written, "Exported new jobs"),
                Ok(Err(e)) => tracing::warn!(run_id = %run_id, error = %e, "Export failed"),
                Err(e) => tracing::warn!(run_id = %run_id, error = %e, "Export task failed"),
            }
        }

        let backlog = if self.inner.notifier.is_empty() {
            Vec::new()
        } else {
            self.backlog(result).await
        };
        if result.new_jobs.is_empty() && backlog.is_empty() && !self.inner.config.send_empty_run {
            tracing::info!(run_id = %run_id, "No new jobs, dispatch suppressed");
            self.emit(SchedulerEvent::DispatchSuppressed { run_id });
            return;
        }

        let report = self.inner.notifier.dispatch(result, &backlog).await;

        if report.any_success() {
            let fingerprints: Vec<_> = result
                .new_jobs
                .iter()
                .chain(&backlog)
                .map(|j| j.fingerprint.clone())
                .collect();
            match self.inner.pipeline.store().mark_notified(fingerprints).await {
                Ok(marked) => tracing::debug!(run_id = %run_id, marked, "Marked jobs notified"),
                Err(e) => {
                    tracing::warn!(run_id = %run_id, error = %e, "Failed to mark jobs notified")
                }
            }
        }

        self.emit(SchedulerEvent::Dispatched {
            run_id,
            delivered: report.statuses.len() - report.failures(),
            failed: report.failures(),
            carried_over: backlog.len(),
        });
    }

    /// Undelivered jobs of earlier runs
    ///
    /// A store error leaves the backlog for the next run.
    async fn backlog(&self, result: &RunResult) -> Vec<Job> {
        let fresh: HashSet<&Fingerprint> =
            result.new_jobs.iter().map(|j| &j.fingerprint).collect();
        match self.inner.pipeline.store().unseen(None).await {
            Ok(unseen) => {
                let backlog: Vec<Job> = unseen
                    .into_iter()
                    .filter(|job| !fresh.contains(&job.fingerprint))
                    .collect();
                if !backlog.is_empty() {
                    tracing::info!(
                        run_id = %result.run_id,
                        carried_over = backlog.len(),
                        "Re-sending undelivered jobs"
                    );
                }
                backlog
            }
            Err(e) => {
                tracing::warn!(
                    run_id = %result.run_id,
                    error = %e,
                    "Failed to load undelivered jobs"
                );
                Vec::new()
            }
        }
    }

    // ========================================================================
    // Periodic loop
    // ========================================================================

    /// Run the interval loop until [`Scheduler::stop`] is called
    ///
    /// Each tick triggers a scheduled run in its own task; a tick landing
    /// on a busy slot is dropped. On stop, the loop waits for the run in
    /// flight to finish.
    pub async fn start(&self) -> SchedulerResult<()> {
        let period = self.inner.config.interval();
        if period.is_zero() {
            return Err(SchedulerError::invalid_config(
                "interval_hours",
                "interval must be greater than 0",
            ));
        }

        if self.inner.loop_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }

        self.inner.shutdown.send_replace(false);
        let mut shutdown = self.inner.shutdown.subscribe();

        let first_tick = if self.inner.config.run_on_start {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut ticker = interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = period.as_secs(),
            run_on_start = self.inner.config.run_on_start,
            "Scheduler started"
        );

        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let scheduler = self.clone();
                    in_flight.spawn(async move {
                        match scheduler.trigger(TriggerKind::Scheduled, RunMode::Live).await {
                            Ok(_) | Err(SchedulerError::RunInProgress { .. }) => {}
                            Err(e) => {
                                let err = Error::from(e);
                                tracing::error!(
                                    category = err.category().as_str(),
                                    recoverable = err.is_recoverable(),
                                    error = %err,
                                    "Scheduled run failed"
                                );
                            }
                        }
                    });
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            tracing::info!("Waiting for the run in progress to finish");
        }
        while in_flight.join_next().await.is_some() {}

        self.inner.loop_running.store(false, Ordering::SeqCst);
        tracing::info!("Scheduler stopped");
        Ok(())
    }

    /// Ask the interval loop to stop
    pub fn stop(&self) {
        self.inner.shutdown.send_replace(true);
    }
}
