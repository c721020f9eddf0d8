//! Cluster error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid node: {0}")]
    InvalidNode(String),

    #[error("state store error: {0}")]
    State(#[from] podling_state::StateError),
}

pub type ClusterResult<T> = Result<T, ClusterError>;
