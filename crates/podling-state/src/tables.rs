//! redb table definitions for the persistent backend.
//!
//! Every table uses `&str` keys and `&[u8]` values (JSON-serialized
//! domain types). Namespaced objects are keyed by ID; namespace filtering
//! happens on the decoded value.

use redb::TableDefinition;

/// Tasks keyed by task ID.
pub const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

/// Pods keyed by pod ID.
pub const PODS: TableDefinition<&str, &[u8]> = TableDefinition::new("pods");

/// Nodes keyed by node ID.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Services keyed by service ID.
pub const SERVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("services");

/// Endpoint sets keyed by the owning service ID.
pub const ENDPOINTS: TableDefinition<&str, &[u8]> = TableDefinition::new("endpoints");
