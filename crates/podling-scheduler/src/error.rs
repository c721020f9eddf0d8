//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur during scheduling and placement.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no available nodes for {kind} {id}")]
    NoAvailableNodes { kind: &'static str, id: String },

    #[error("invalid workload: {0}")]
    InvalidWorkload(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("state store error: {0}")]
    State(#[from] podling_state::StateError),
}

impl SchedulerError {
    pub fn is_no_available_nodes(&self) -> bool {
        matches!(self, Self::NoAvailableNodes { .. })
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
