//! Bulk deletion of finished or dead objects.
//!
//! Without `all`, only objects that are done are removed: tasks that
//! completed or failed, pods that succeeded or failed, and offline nodes.
//! Services have no finished state and are removed only when `all` is set.
//! With `all`, every object of the targeted kinds goes.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use podling_endpoints::{EndpointController, EndpointError};
use podling_state::*;

/// Which kinds of object a prune touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneTarget {
    Tasks,
    Pods,
    Nodes,
    Services,
    All,
}

impl PruneTarget {
    fn includes(self, kind: PruneTarget) -> bool {
        self == PruneTarget::All || self == kind
    }
}

/// Body of `POST /api/v1/prune`.
#[derive(Debug, Clone, Deserialize)]
pub struct PruneRequest {
    pub target: PruneTarget,
    #[serde(default)]
    pub all: bool,
}

/// Number of objects removed per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub tasks: usize,
    pub pods: usize,
    pub nodes: usize,
    pub services: usize,
}

/// Delete the objects selected by `target` and `all`.
///
/// Objects that disappear between listing and deletion are skipped.
/// Services are deleted through `endpoints` so their ClusterIPs and
/// endpoint records are released with them.
pub fn prune(
    store: &dyn StateStore,
    endpoints: &EndpointController,
    target: PruneTarget,
    all: bool,
) -> StateResult<PruneReport> {
    let mut report = PruneReport::default();

    if target.includes(PruneTarget::Tasks) {
        for task in store.list_tasks()? {
            if all || task.status.is_terminal() {
                report.tasks += count_deleted(store.delete_task(&task.id))?;
            }
        }
    }

    if target.includes(PruneTarget::Pods) {
        for pod in store.list_pods(None)? {
            if all || pod.status.is_terminal() {
                report.pods += count_deleted(store.delete_pod(&pod.id))?;
            }
        }
    }

    if target.includes(PruneTarget::Nodes) {
        for node in store.list_nodes()? {
            if all || !node.is_online() {
                report.nodes += count_deleted(store.delete_node(&node.id))?;
            }
        }
    }

    if all && target.includes(PruneTarget::Services) {
        for service in store.list_services(None)? {
            match endpoints.delete_service(&service.id) {
                Ok(_) => report.services += 1,
                Err(EndpointError::State(e)) if e.is_not_found() => {}
                Err(EndpointError::State(e)) => return Err(e),
                Err(e) => warn!(service_id = %service.id, error = %e, "service prune failed"),
            }
        }
    }

    info!(
        ?target,
        all,
        tasks = report.tasks,
        pods = report.pods,
        nodes = report.nodes,
        services = report.services,
        "prune complete"
    );
    Ok(report)
}

fn count_deleted<T>(result: StateResult<T>) -> StateResult<usize> {
    match result {
        Ok(_) => Ok(1),
        Err(e) if e.is_not_found() => Ok(0),
        Err(e) => Err(e),
    }
}
