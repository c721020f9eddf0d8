//! Membership: node registration, heartbeats and deregistration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use podling_state::*;

use crate::error::{ClusterError, ClusterResult};

/// Task slots given to a node that registers without a slot limit.
pub const DEFAULT_NODE_CAPACITY: u32 = 100;

/// Registration payload sent by a worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    /// Requested node ID; generated when absent.
    pub id: Option<NodeId>,
    pub hostname: String,
    pub port: u16,
    /// Legacy slot limit; 0 means [`DEFAULT_NODE_CAPACITY`].
    pub capacity: u32,
    pub resources: Option<NodeResources>,
    pub labels: HashMap<String, String>,
}

/// Usage report carried by a heartbeat. Absent fields leave the node's
/// stored values untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatReport {
    pub used: Option<ResourceList>,
    pub running_tasks: Option<u32>,
}

/// Tracks cluster membership in the state store.
pub struct Membership {
    store: SharedStore,
}

impl Membership {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Register a node. It starts online with a fresh heartbeat.
    ///
    /// A resource block without `allocatable` is treated as fully
    /// allocatable (`allocatable = capacity`). A missing slot limit falls
    /// back to [`DEFAULT_NODE_CAPACITY`].
    pub fn register(&self, req: RegisterRequest) -> ClusterResult<Node> {
        if req.hostname.is_empty() {
            return Err(ClusterError::InvalidNode("hostname is required".to_string()));
        }
        if req.port == 0 {
            return Err(ClusterError::InvalidNode("port must be nonzero".to_string()));
        }

        let resources = req.resources.map(|mut res| {
            if res.allocatable.is_zero() {
                res.allocatable = res.capacity;
            }
            res
        });

        let node = Node {
            id: req
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            hostname: req.hostname,
            port: req.port,
            status: NodeStatus::Online,
            last_heartbeat: epoch_millis(),
            running_tasks: 0,
            capacity: if req.capacity == 0 {
                DEFAULT_NODE_CAPACITY
            } else {
                req.capacity
            },
            resources,
            labels: req.labels,
        };

        self.store.add_node(&node)?;
        info!(
            node_id = %node.id,
            address = %node.address(),
            capacity = node.capacity,
            "node registered"
        );
        Ok(node)
    }

    /// Record a heartbeat: mark the node online, refresh its timestamp and
    /// apply the usage report.
    pub fn heartbeat(&self, node_id: &str, report: HeartbeatReport) -> ClusterResult<Node> {
        let was_online = self.store.get_node(node_id)?.is_online();

        let node = self.store.update_node(
            node_id,
            &NodeUpdate {
                status: Some(NodeStatus::Online),
                last_heartbeat: Some(epoch_millis()),
                running_tasks: report.running_tasks,
                used: report.used,
                ..Default::default()
            },
        )?;

        if was_online {
            debug!(%node_id, running_tasks = node.running_tasks, "heartbeat received");
        } else {
            info!(%node_id, "node back online");
        }
        Ok(node)
    }

    /// Remove a node from the cluster. Its workloads are left untouched.
    pub fn deregister(&self, node_id: &str) -> ClusterResult<Node> {
        let node = self.store.delete_node(node_id)?;
        info!(%node_id, "node deregistered");
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn membership() -> (Membership, SharedStore) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        (Membership::new(store.clone()), store)
    }

    fn request(id: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            id: id.map(str::to_string),
            hostname: "worker-1".to_string(),
            port: 8081,
            capacity: 10,
            ..Default::default()
        }
    }

    #[test]
    fn register_creates_online_node() {
        let (membership, store) = membership();
        let before = epoch_millis();

        let node = membership.register(request(None)).unwrap();
        assert!(!node.id.is_empty());
        assert!(node.is_online());
        assert!(node.last_heartbeat >= before);
        assert_eq!(store.get_node(&node.id).unwrap(), node);
    }

    #[test]
    fn register_keeps_requested_id_and_rejects_duplicates() {
        let (membership, _) = membership();
        let node = membership.register(request(Some("n1"))).unwrap();
        assert_eq!(node.id, "n1");

        let err = membership.register(request(Some("n1"))).unwrap_err();
        assert!(matches!(err, ClusterError::State(ref e) if e.is_already_exists()));
    }

    #[test]
    fn register_validates_address() {
        let (membership, _) = membership();
        let mut req = request(None);
        req.hostname.clear();
        assert!(matches!(
            membership.register(req).unwrap_err(),
            ClusterError::InvalidNode(_)
        ));
    }

    #[test]
    fn register_defaults_allocatable_to_capacity() {
        let (membership, _) = membership();
        let mut req = request(None);
        req.resources = Some(NodeResources {
            capacity: ResourceList::new(10_000, 10 << 30),
            ..Default::default()
        });
        let node = membership.register(req).unwrap();
        assert_eq!(
            node.resources.unwrap().allocatable,
            ResourceList::new(10_000, 10 << 30)
        );
    }

    #[test]
    fn register_without_slot_limit_gets_default_capacity() {
        let (membership, store) = membership();
        let req = RegisterRequest {
            id: Some("n1".to_string()),
            hostname: "worker-1".to_string(),
            port: 8081,
            resources: Some(NodeResources {
                capacity: ResourceList::new(10_000, 10 << 30),
                ..Default::default()
            }),
            ..Default::default()
        };

        let node = membership.register(req).unwrap();
        assert_eq!(node.capacity, DEFAULT_NODE_CAPACITY);
        assert!(node.has_free_slot());
        assert_eq!(store.get_available_nodes().unwrap().len(), 1);
    }

    #[test]
    fn heartbeat_revives_node_and_applies_usage() {
        let (membership, store) = membership();
        let mut req = request(Some("n1"));
        req.resources = Some(NodeResources {
            capacity: ResourceList::new(4000, 4096),
            ..Default::default()
        });
        membership.register(req).unwrap();
        store
            .update_node(
                "n1",
                &NodeUpdate {
                    status: Some(NodeStatus::Offline),
                    last_heartbeat: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();

        let node = membership
            .heartbeat(
                "n1",
                HeartbeatReport {
                    used: Some(ResourceList::new(500, 1024)),
                    running_tasks: Some(3),
                },
            )
            .unwrap();
        assert!(node.is_online());
        assert!(node.last_heartbeat > 1);
        assert_eq!(node.running_tasks, 3);
        assert_eq!(node.resources.unwrap().used, ResourceList::new(500, 1024));
    }

    #[test]
    fn empty_heartbeat_keeps_usage() {
        let (membership, _) = membership();
        membership.register(request(Some("n1"))).unwrap();
        membership
            .heartbeat(
                "n1",
                HeartbeatReport {
                    running_tasks: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();

        let node = membership.heartbeat("n1", HeartbeatReport::default()).unwrap();
        assert_eq!(node.running_tasks, 2);
    }

    #[test]
    fn heartbeat_from_unknown_node_is_not_found() {
        let (membership, _) = membership();
        let err = membership.heartbeat("ghost", HeartbeatReport::default()).unwrap_err();
        assert!(matches!(err, ClusterError::State(ref e) if e.is_not_found()));
    }

    #[test]
    fn deregister_removes_node() {
        let (membership, store) = membership();
        membership.register(request(Some("n1"))).unwrap();
        membership.deregister("n1").unwrap();
        assert!(store.get_node("n1").unwrap_err().is_not_found());
    }

    #[test]
    fn heartbeat_report_accepts_partial_json() {
        let report: HeartbeatReport = serde_json::from_str(r#"{"running_tasks": 4}"#).unwrap();
        assert_eq!(report.running_tasks, Some(4));
        assert!(report.used.is_none());
    }
}
