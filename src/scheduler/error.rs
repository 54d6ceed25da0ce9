//! Error types for the scheduler module

use std::fmt;

use uuid::Uuid;

use crate::utils::error::StoreError;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// A trigger arrived while another run was executing; it was dropped
    RunInProgress {
        active_run: Uuid,
    },

    /// The run was aborted by a store failure
    RunFailed {
        run_id: Uuid,
        source: StoreError,
    },

    /// The periodic loop is already running
    AlreadyStarted,

    /// Scheduler configuration cannot be used
    InvalidConfig {
        field: String,
        reason: String,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunInProgress { active_run } => {
                write!(f, "Run {} is already in progress; trigger dropped", active_run)
            }
            Self::RunFailed { run_id, source } => {
                write!(f, "Run {} failed: {}", run_id, source)
            }
            Self::AlreadyStarted => {
                write!(f, "Scheduler loop is already running")
            }
            Self::InvalidConfig { field, reason } => {
                write!(f, "Scheduler config error in '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RunFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl SchedulerError {
    /// Create a run-in-progress error
    pub fn run_in_progress(active_run: Uuid) -> Self {
        Self::RunInProgress { active_run }
    }

    /// Create a run-failed error
    pub fn run_failed(run_id: Uuid, source: StoreError) -> Self {
        Self::RunFailed { run_id, source }
    }

    /// Create an invalid config error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    ///
    /// A dropped trigger or a failed run does not prevent the next
    /// scheduled run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RunInProgress { .. } | Self::RunFailed { .. })
    }
}
