//! Scheduler: selects a node for a task or pod.
//!
//! Selection is a pure function of the candidate snapshot plus the shared
//! rotation cursor. The scheduler never reads or writes the state store.

use tracing::debug;

use podling_state::{Node, Pod, ResourceList, Task};

use crate::error::{SchedulerError, SchedulerResult};
use crate::rotation::RoundRobin;

/// A workload the scheduler can place.
pub trait Schedulable {
    /// Kind label used in logs and errors ("task", "pod").
    fn kind(&self) -> &'static str;

    fn id(&self) -> &str;

    /// Total resources the workload requests.
    fn requests(&self) -> ResourceList;
}

impl Schedulable for Task {
    fn kind(&self) -> &'static str {
        "task"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn requests(&self) -> ResourceList {
        self.resources.requests
    }
}

impl Schedulable for Pod {
    fn kind(&self) -> &'static str {
        "pod"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn requests(&self) -> ResourceList {
        self.total_requests()
    }
}

/// True if `node` may receive a workload requesting `requests`.
///
/// Nodes without a resource block are only checked against the legacy
/// slot limit.
pub fn qualifies(node: &Node, requests: &ResourceList) -> bool {
    node.is_online()
        && node.has_free_slot()
        && node
            .resources
            .as_ref()
            .is_none_or(|res| res.can_fit(requests))
}

/// Filter + round-robin node selector.
///
/// One cursor is shared by task and pod selections.
#[derive(Debug, Default)]
pub struct Scheduler {
    rotation: RoundRobin,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a node for `workload` from `candidates`.
    ///
    /// Fails with [`SchedulerError::NoAvailableNodes`] if no candidate
    /// qualifies; the cursor does not move in that case.
    pub fn select_node<W>(&self, workload: &W, candidates: &[Node]) -> SchedulerResult<Node>
    where
        W: Schedulable + ?Sized,
    {
        let requests = workload.requests();
        let selected = self.rotation.pick(|| {
            candidates
                .iter()
                .filter(|n| qualifies(n, &requests))
                .collect::<Vec<_>>()
        });

        match selected {
            Some(node) => {
                debug!(
                    kind = workload.kind(),
                    id = %workload.id(),
                    node_id = %node.id,
                    "node selected"
                );
                Ok(node.clone())
            }
            None => Err(SchedulerError::NoAvailableNodes {
                kind: workload.kind(),
                id: workload.id().to_string(),
            }),
        }
    }

    pub fn select_node_for_task(&self, task: &Task, candidates: &[Node]) -> SchedulerResult<Node> {
        self.select_node(task, candidates)
    }

    pub fn select_node_for_pod(&self, pod: &Pod, candidates: &[Node]) -> SchedulerResult<Node> {
        self.select_node(pod, candidates)
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> usize {
        self.rotation.position()
    }
}
