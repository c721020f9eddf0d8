//! podling-cluster: node membership and liveness.
//!
//! Workers register themselves, heartbeat periodically, and deregister on
//! shutdown through [`Membership`]. The [`LivenessMonitor`] marks nodes
//! whose heartbeat has gone stale as offline so the scheduler stops
//! choosing them. Nodes are never deleted for missing heartbeats.

pub mod error;
pub mod liveness;
pub mod membership;

pub use error::{ClusterError, ClusterResult};
pub use liveness::LivenessMonitor;
pub use membership::{DEFAULT_NODE_CAPACITY, HeartbeatReport, Membership, RegisterRequest};
