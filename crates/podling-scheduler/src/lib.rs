//! podling-scheduler: node selection and workload placement.
//!
//! The [`Scheduler`] picks a node for a task or pod from a snapshot of
//! candidate nodes. It filters on status, slot capacity and resource fit,
//! then rotates through the qualifying nodes with one shared cursor.
//!
//! The [`Placer`] wraps the scheduler with the create-and-place flow used
//! by the API: persist the workload, select a node, record the assignment
//! and hand the workload to a [`Dispatcher`].
//!
//! # Architecture
//!
//! ```text
//! Placer
//!   ├── StateStore (persist workload, read available nodes, write assignment)
//!   ├── Scheduler
//!   │     └── RoundRobin (cursor behind a mutex, shared by tasks and pods)
//!   └── Dispatcher (fire-and-forget POST to the chosen worker)
//! ```

pub mod dispatch;
pub mod error;
pub mod placement;
pub mod rotation;
pub mod scheduler;

pub use dispatch::{Dispatcher, HttpDispatcher};
pub use error::{SchedulerError, SchedulerResult};
pub use placement::{Placement, Placer};
pub use rotation::RoundRobin;
pub use scheduler::{Schedulable, Scheduler};
