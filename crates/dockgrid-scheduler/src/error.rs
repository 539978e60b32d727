//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur while planning placements from stored state.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("state store error: {0}")]
    State(#[from] dockgrid_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
