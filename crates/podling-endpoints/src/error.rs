//! Endpoint controller error types.

use thiserror::Error;

/// Errors from ClusterIP allocation and service lifecycle operations.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// No free address left in the ClusterIP block.
    #[error("cluster IP pool exhausted: {0}")]
    PoolExhausted(String),

    /// Release of an address that is not currently allocated.
    #[error("cluster IP not allocated: {0}")]
    NotAllocated(String),

    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid service: {0}")]
    InvalidService(String),

    #[error("state store error: {0}")]
    State(#[from] podling_state::StateError),
}

pub type EndpointResult<T> = Result<T, EndpointError>;
