//! podling-endpoints: service discovery records.
//!
//! Two pieces:
//!
//! - [`ClusterIpAllocator`] hands out virtual IPs from a configured IPv4
//!   block and takes them back when services are deleted.
//! - [`EndpointController`] owns the allocator, implements the service
//!   create/delete lifecycle, and periodically rewrites every service's
//!   [`Endpoints`](podling_state::Endpoints) record from the pods its
//!   selector matches.

pub mod allocator;
pub mod controller;
pub mod error;

pub use allocator::{ClusterIpAllocator, Ipv4Cidr};
pub use controller::{EndpointController, SyncStats, compute_endpoints};
pub use error::{EndpointError, EndpointResult};
