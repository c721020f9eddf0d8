//! podling-state: the authoritative cluster state for Podling.
//!
//! Every other component reads and mutates tasks, pods, nodes, services
//! and endpoint sets exclusively through the [`StateStore`] trait. Two
//! backends implement the same contract:
//!
//! - [`MemoryStore`]: one `RwLock` guarding a map per entity type.
//! - [`RedbStore`]: [redb](https://docs.rs/redb) tables holding
//!   JSON-serialized objects, on disk or in memory.
//!
//! # Contract
//!
//! ```text
//! add_*     → AlreadyExists if the key is present (original untouched)
//! get_*     → NotFound if absent
//! update_*  → partial update record, None fields are no-ops, NotFound if absent
//! list_*    → copies, optionally filtered
//! delete_*  → NotFound if absent, returns the removed object
//! ```
//!
//! Readers always receive copies; nothing escapes a backend's lock.

pub mod error;
pub mod memory;
pub mod persistent;
pub mod store;
pub mod tables;
pub mod types;
pub mod update;

pub use error::{StateError, StateResult};
pub use memory::MemoryStore;
pub use persistent::RedbStore;
pub use store::{SharedStore, StateStore};
pub use types::*;
pub use update::*;
