//! Trigger events and the single-flight run slot

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::{SchedulerError, SchedulerResult};
use crate::metrics;
use crate::models::{RunMode, TriggerKind};

// ============================================================================
// Scheduler Events
// ============================================================================

/// Events broadcast by the scheduler
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A run acquired the slot and started
    RunStarted {
        run_id: Uuid,
        trigger: TriggerKind,
        mode: RunMode,
        started_at: DateTime<Utc>,
    },

    /// A run finished and its result was handed off
    RunCompleted {
        run_id: Uuid,
        new_jobs: usize,
        duplicates: usize,
        partial: bool,
    },

    /// A run was aborted
    RunFailed {
        run_id: Uuid,
        reason: String,
    },

    /// A trigger arrived while another run was executing
    TriggerDropped {
        trigger: TriggerKind,
        active_run: Uuid,
    },

    /// The digest was delivered (or attempted)
    Dispatched {
        run_id: Uuid,
        delivered: usize,
        failed: usize,
        /// Undelivered jobs of earlier runs included in the digest
        carried_over: usize,
    },

    /// Dispatch was skipped (dry run, or empty run with `send_empty_run` off)
    DispatchSuppressed {
        run_id: Uuid,
    },
}

// ============================================================================
// Run Slot
// ============================================================================

/// At most one run holds the slot at a time
///
/// Check-and-set happens under one lock, so two triggers can never both
/// acquire it.
#[derive(Debug, Clone, Default)]
pub struct RunSlot {
    active: Arc<Mutex<Option<Uuid>>>,
}

impl RunSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `run_id`
    ///
    /// Fails with [`SchedulerError::RunInProgress`] naming the active run.
    pub fn try_acquire(&self, run_id: Uuid) -> SchedulerResult<RunGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = *active {
            return Err(SchedulerError::run_in_progress(current));
        }
        *active = Some(run_id);
        metrics::set_run_in_progress(true);

        Ok(RunGuard {
            slot: Arc::clone(&self.active),
            run_id,
        })
    }

    /// Run currently holding the slot
    pub fn active(&self) -> Option<Uuid> {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_busy(&self) -> bool {
        self.active().is_some()
    }
}

/// Releases the slot on drop, including when the run is cancelled
#[derive(Debug)]
pub struct RunGuard {
    slot: Arc<Mutex<Option<Uuid>>>,
    run_id: Uuid,
}

impl RunGuard {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut active = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if *active == Some(self.run_id) {
            *active = None;
        }
        metrics::set_run_in_progress(false);
    }
}
