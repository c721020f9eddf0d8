//! The state store contract.
//!
//! Core components depend only on [`StateStore`]; the concrete backend is
//! chosen once at startup and shared as a [`SharedStore`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StateResult;
use crate::types::*;
use crate::update::*;

/// A store shared across request handlers and background loops.
pub type SharedStore = Arc<dyn StateStore>;

/// Authoritative repository of cluster objects.
///
/// Every operation is atomic with respect to concurrent callers and every
/// read returns a copy. `add_*` fails with `AlreadyExists` on duplicate
/// keys; `get_*`, `update_*` and `delete_*` fail with `NotFound` when the
/// key is absent, leaving the store unchanged. Listings are ordered by ID.
pub trait StateStore: Send + Sync {
    // ── Tasks ──────────────────────────────────────────────────────

    fn add_task(&self, task: &Task) -> StateResult<()>;
    fn get_task(&self, id: &str) -> StateResult<Task>;
    fn update_task(&self, id: &str, update: &TaskUpdate) -> StateResult<Task>;
    fn list_tasks(&self) -> StateResult<Vec<Task>>;
    fn delete_task(&self, id: &str) -> StateResult<Task>;

    // ── Pods ───────────────────────────────────────────────────────

    fn add_pod(&self, pod: &Pod) -> StateResult<()>;
    fn get_pod(&self, id: &str) -> StateResult<Pod>;
    /// Annotations in `update` are merged into the stored map.
    fn update_pod(&self, id: &str, update: &PodUpdate) -> StateResult<Pod>;
    /// All pods, or only those in `namespace` when given.
    fn list_pods(&self, namespace: Option<&str>) -> StateResult<Vec<Pod>>;
    fn delete_pod(&self, id: &str) -> StateResult<Pod>;

    /// Pods in `namespace` (empty means `"default"`) whose labels are a
    /// superset of `selector`.
    fn list_pods_by_labels(
        &self,
        namespace: &str,
        selector: &HashMap<String, String>,
    ) -> StateResult<Vec<Pod>> {
        let namespace = effective_namespace(namespace);
        let pods = self.list_pods(Some(namespace))?;
        Ok(pods
            .into_iter()
            .filter(|p| labels_match(&p.labels, selector))
            .collect())
    }

    // ── Nodes ──────────────────────────────────────────────────────

    fn add_node(&self, node: &Node) -> StateResult<()>;
    fn get_node(&self, id: &str) -> StateResult<Node>;
    fn update_node(&self, id: &str, update: &NodeUpdate) -> StateResult<Node>;
    fn list_nodes(&self) -> StateResult<Vec<Node>>;
    fn delete_node(&self, id: &str) -> StateResult<Node>;

    /// Nodes that are online and below their task-slot capacity.
    fn get_available_nodes(&self) -> StateResult<Vec<Node>> {
        let nodes = self.list_nodes()?;
        Ok(nodes
            .into_iter()
            .filter(|n| n.is_online() && n.has_free_slot())
            .collect())
    }

    // ── Services ───────────────────────────────────────────────────

    fn add_service(&self, service: &Service) -> StateResult<()>;
    fn get_service(&self, id: &str) -> StateResult<Service>;
    fn update_service(&self, id: &str, update: &ServiceUpdate) -> StateResult<Service>;
    fn list_services(&self, namespace: Option<&str>) -> StateResult<Vec<Service>>;
    fn delete_service(&self, id: &str) -> StateResult<Service>;

    // ── Endpoints (keyed by service ID) ────────────────────────────

    fn add_endpoints(&self, endpoints: &Endpoints) -> StateResult<()>;
    fn get_endpoints(&self, service_id: &str) -> StateResult<Endpoints>;
    /// Insert or fully replace the endpoints of a service.
    fn set_endpoints(&self, endpoints: &Endpoints) -> StateResult<()>;
    fn list_endpoints(&self, namespace: Option<&str>) -> StateResult<Vec<Endpoints>>;
    fn delete_endpoints(&self, service_id: &str) -> StateResult<Endpoints>;
}

/// Shared contract tests run against every backend.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;
    use crate::error::StateError;

    pub fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            name: format!("task-{id}"),
            image: "busybox:latest".to_string(),
            created_at: 1000,
            ..Default::default()
        }
    }

    pub fn pod(id: &str, namespace: &str, labels: &[(&str, &str)]) -> Pod {
        Pod {
            id: id.to_string(),
            name: format!("pod-{id}"),
            namespace: namespace.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            containers: vec![Container {
                name: "app".to_string(),
                image: "nginx:1.27".to_string(),
                ..Default::default()
            }],
            created_at: 1000,
            ..Default::default()
        }
    }

    pub fn node(id: &str, status: NodeStatus, running: u32, capacity: u32) -> Node {
        Node {
            id: id.to_string(),
            hostname: format!("{id}.local"),
            port: 8081,
            status,
            last_heartbeat: 1000,
            running_tasks: running,
            capacity,
            ..Default::default()
        }
    }

    pub fn service(id: &str, namespace: &str) -> Service {
        Service {
            id: id.to_string(),
            name: format!("svc-{id}"),
            namespace: namespace.to_string(),
            selector: HashMap::from([("app".to_string(), "web".to_string())]),
            ports: vec![ServicePort {
                port: 80,
                target_port: 8080,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    pub fn duplicate_add_keeps_original(store: &dyn StateStore) {
        let original = task("t1");
        store.add_task(&original).unwrap();

        let mut dup = task("t1");
        dup.name = "impostor".to_string();
        let err = store.add_task(&dup).unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists { kind: "task", .. }));
        assert_eq!(store.get_task("t1").unwrap(), original);
    }

    pub fn update_missing_is_not_found(store: &dyn StateStore) {
        let err = store
            .update_task(
                "ghost",
                &TaskUpdate {
                    status: Some(TaskStatus::Running),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.list_tasks().unwrap().is_empty());

        assert!(store.update_pod("ghost", &PodUpdate::default()).unwrap_err().is_not_found());
        assert!(store.update_node("ghost", &NodeUpdate::default()).unwrap_err().is_not_found());
        assert!(
            store
                .update_service("ghost", &ServiceUpdate::default())
                .unwrap_err()
                .is_not_found()
        );
    }

    pub fn get_and_delete_missing(store: &dyn StateStore) {
        assert!(store.get_task("nope").unwrap_err().is_not_found());
        assert!(store.get_pod("nope").unwrap_err().is_not_found());
        assert!(store.get_node("nope").unwrap_err().is_not_found());
        assert!(store.get_service("nope").unwrap_err().is_not_found());
        assert!(store.get_endpoints("nope").unwrap_err().is_not_found());
        assert!(store.delete_task("nope").unwrap_err().is_not_found());
        assert!(store.delete_pod("nope").unwrap_err().is_not_found());
        assert!(store.delete_node("nope").unwrap_err().is_not_found());
        assert!(store.delete_service("nope").unwrap_err().is_not_found());
        assert!(store.delete_endpoints("nope").unwrap_err().is_not_found());
    }

    pub fn partial_update_applies_only_set_fields(store: &dyn StateStore) {
        store.add_task(&task("t1")).unwrap();
        let updated = store
            .update_task(
                "t1",
                &TaskUpdate {
                    status: Some(TaskStatus::Scheduled),
                    node_id: Some("n1".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Scheduled);
        assert_eq!(updated.node_id.as_deref(), Some("n1"));
        assert_eq!(updated.image, "busybox:latest");
        assert_eq!(store.get_task("t1").unwrap(), updated);
    }

    pub fn annotation_update_merges(store: &dyn StateStore) {
        let mut p = pod("p1", "default", &[("app", "web")]);
        p.annotations.insert("owner".to_string(), "team-a".to_string());
        store.add_pod(&p).unwrap();

        store
            .update_pod(
                "p1",
                &PodUpdate {
                    annotations: Some(HashMap::from([(
                        POD_IP_ANNOTATION.to_string(),
                        "10.1.0.4".to_string(),
                    )])),
                    ..Default::default()
                },
            )
            .unwrap();

        let stored = store.get_pod("p1").unwrap();
        assert_eq!(stored.annotations.get("owner").unwrap(), "team-a");
        assert_eq!(stored.pod_ip(), Some("10.1.0.4"));
        assert_eq!(stored.labels.get("app").unwrap(), "web");
    }

    pub fn pods_by_labels(store: &dyn StateStore) {
        store.add_pod(&pod("p1", "", &[("app", "web"), ("tier", "front")])).unwrap();
        store.add_pod(&pod("p2", "default", &[("app", "web")])).unwrap();
        store.add_pod(&pod("p3", "default", &[("app", "db")])).unwrap();
        store.add_pod(&pod("p4", "staging", &[("app", "web")])).unwrap();

        let selector = HashMap::from([("app".to_string(), "web".to_string())]);
        let mut ids: Vec<String> = store
            .list_pods_by_labels("", &selector)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["p1", "p2"]);

        let staging = store.list_pods_by_labels("staging", &selector).unwrap();
        assert_eq!(staging.len(), 1);
        assert_eq!(staging[0].id, "p4");

        let both = HashMap::from([
            ("app".to_string(), "web".to_string()),
            ("tier".to_string(), "front".to_string()),
        ]);
        let narrowed = store.list_pods_by_labels("default", &both).unwrap();
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].id, "p1");
    }

    pub fn available_nodes(store: &dyn StateStore) {
        store.add_node(&node("n1", NodeStatus::Online, 0, 4)).unwrap();
        store.add_node(&node("n2", NodeStatus::Offline, 0, 4)).unwrap();
        store.add_node(&node("n3", NodeStatus::Online, 4, 4)).unwrap();
        store.add_node(&node("n4", NodeStatus::Online, 3, 4)).unwrap();

        let mut ids: Vec<String> = store
            .get_available_nodes()
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["n1", "n4"]);
    }

    pub fn endpoints_replace(store: &dyn StateStore) {
        let mut eps = Endpoints {
            service_id: "s1".to_string(),
            service_name: "svc-s1".to_string(),
            namespace: "default".to_string(),
            subsets: vec![EndpointSubset {
                addresses: vec![EndpointAddress {
                    ip: "10.1.0.4".to_string(),
                    pod_id: "p1".to_string(),
                    node_id: "n1".to_string(),
                }],
                ..Default::default()
            }],
            updated_at: 1000,
        };
        store.set_endpoints(&eps).unwrap();
        assert!(store.add_endpoints(&eps).unwrap_err().is_already_exists());

        eps.subsets.clear();
        store.set_endpoints(&eps).unwrap();
        assert!(store.get_endpoints("s1").unwrap().subsets.is_empty());
        assert_eq!(store.list_endpoints(Some("default")).unwrap().len(), 1);
        assert!(store.list_endpoints(Some("other")).unwrap().is_empty());

        let removed = store.delete_endpoints("s1").unwrap();
        assert_eq!(removed.service_id, "s1");
    }

    pub fn services_by_namespace(store: &dyn StateStore) {
        store.add_service(&service("s1", "default")).unwrap();
        store.add_service(&service("s2", "prod")).unwrap();
        assert_eq!(store.list_services(None).unwrap().len(), 2);
        assert_eq!(store.list_services(Some("prod")).unwrap().len(), 1);

        let updated = store
            .update_service(
                "s1",
                &ServiceUpdate {
                    annotations: Some(HashMap::from([("a".to_string(), "1".to_string())])),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.annotations.get("a").unwrap(), "1");
        assert!(updated.updated_at > 0);

        let removed = store.delete_service("s2").unwrap();
        assert_eq!(removed.namespace, "prod");
        assert_eq!(store.list_services(None).unwrap().len(), 1);
    }

    pub fn run_all<S: StateStore>(make: impl Fn() -> S) {
        duplicate_add_keeps_original(&make());
        update_missing_is_not_found(&make());
        get_and_delete_missing(&make());
        partial_update_applies_only_set_fields(&make());
        annotation_update_merges(&make());
        pods_by_labels(&make());
        available_nodes(&make());
        endpoints_replace(&make());
        services_by_namespace(&make());
        listings_are_ordered_by_id(&make());
    }

    pub fn listings_are_ordered_by_id(store: &dyn StateStore) {
        for id in ["n3", "n1", "n2"] {
            store.add_node(&node(id, NodeStatus::Online, 0, 4)).unwrap();
        }
        let ids: Vec<_> = store.list_nodes().unwrap().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, ["n1", "n2", "n3"]);
    }
}
