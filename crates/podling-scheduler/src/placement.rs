//! Placement flow: create a workload and assign it to a node.
//!
//! A placement:
//! 1. validates and normalizes the workload (ID, namespace, status, timestamp)
//! 2. persists it as `pending`
//! 3. asks the [`Scheduler`] for a node among the store's available nodes
//! 4. records the assignment (`scheduled` + node ID) and dispatches
//!
//! A scheduling failure after step 2 is not an error of the whole
//! operation: the workload stays `pending` and the failure is returned
//! alongside it in [`Placement::error`].

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use podling_state::*;

use crate::dispatch::Dispatcher;
use crate::error::{SchedulerError, SchedulerResult};
use crate::scheduler::Scheduler;

/// Outcome of a create-and-place request.
#[derive(Debug)]
pub struct Placement<T> {
    /// The stored workload, `scheduled` on success or still `pending`.
    pub object: T,
    /// Why the workload could not be placed, if it wasn't.
    pub error: Option<SchedulerError>,
}

impl<T> Placement<T> {
    pub fn is_scheduled(&self) -> bool {
        self.error.is_none()
    }
}

/// Creates tasks and pods and places them on nodes.
pub struct Placer {
    store: SharedStore,
    scheduler: Arc<Scheduler>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
}

impl Placer {
    pub fn new(store: SharedStore, scheduler: Arc<Scheduler>) -> Self {
        Self {
            store,
            scheduler,
            dispatcher: None,
        }
    }

    /// Attach a dispatcher that receives every placed workload.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Create a task and try to schedule it.
    pub fn create_task(&self, mut task: Task) -> SchedulerResult<Placement<Task>> {
        if task.image.is_empty() {
            return Err(SchedulerError::InvalidWorkload("task image is required".to_string()));
        }
        if task.id.is_empty() {
            task.id = Uuid::new_v4().to_string();
        }
        if task.name.is_empty() {
            task.name = task.id.clone();
        }
        task.status = TaskStatus::Pending;
        task.node_id = None;
        task.created_at = epoch_millis();

        self.store.add_task(&task)?;
        info!(task_id = %task.id, name = %task.name, "task created");

        let nodes = self.store.get_available_nodes()?;
        let node = match self.scheduler.select_node_for_task(&task, &nodes) {
            Ok(node) => node,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "task left pending");
                return Ok(Placement {
                    object: task,
                    error: Some(e),
                });
            }
        };

        let task = self.store.update_task(
            &task.id,
            &TaskUpdate {
                status: Some(TaskStatus::Scheduled),
                node_id: Some(node.id.clone()),
                ..Default::default()
            },
        )?;
        info!(task_id = %task.id, node_id = %node.id, "task scheduled");

        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.dispatch_task(&node, &task);
        }
        Ok(Placement {
            object: task,
            error: None,
        })
    }

    /// Create a pod and try to schedule it.
    pub fn create_pod(&self, mut pod: Pod) -> SchedulerResult<Placement<Pod>> {
        pod.validate().map_err(SchedulerError::InvalidWorkload)?;
        if pod.id.is_empty() {
            pod.id = Uuid::new_v4().to_string();
        }
        if pod.namespace.is_empty() {
            pod.namespace = DEFAULT_NAMESPACE.to_string();
        }
        pod.status = PodStatus::Pending;
        pod.node_id = None;
        pod.created_at = epoch_millis();
        pod.scheduled_at = None;

        self.store.add_pod(&pod)?;
        info!(pod_id = %pod.id, name = %pod.name, namespace = %pod.namespace, "pod created");

        let nodes = self.store.get_available_nodes()?;
        let node = match self.scheduler.select_node_for_pod(&pod, &nodes) {
            Ok(node) => node,
            Err(e) => {
                warn!(pod_id = %pod.id, error = %e, "pod left pending");
                return Ok(Placement {
                    object: pod,
                    error: Some(e),
                });
            }
        };

        let pod = self.store.update_pod(
            &pod.id,
            &PodUpdate {
                status: Some(PodStatus::Scheduled),
                node_id: Some(node.id.clone()),
                scheduled_at: Some(epoch_millis()),
                ..Default::default()
            },
        )?;
        info!(pod_id = %pod.id, node_id = %node.id, "pod scheduled");

        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.dispatch_pod(&node, &pod);
        }
        Ok(Placement {
            object: pod,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl Dispatcher for RecordingDispatcher {
        fn dispatch_task(&self, node: &Node, task: &Task) {
            self.sent.lock().unwrap().push((node.id.clone(), task.id.clone()));
        }

        fn dispatch_pod(&self, node: &Node, pod: &Pod) {
            self.sent.lock().unwrap().push((node.id.clone(), pod.id.clone()));
        }
    }

    fn online_node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            hostname: "10.0.0.1".to_string(),
            port: 8081,
            status: NodeStatus::Online,
            capacity: 10,
            last_heartbeat: epoch_millis(),
            ..Default::default()
        }
    }

    fn placer_with(nodes: &[Node]) -> (Placer, SharedStore, Arc<RecordingDispatcher>) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        for node in nodes {
            store.add_node(node).unwrap();
        }
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let placer = Placer::new(store.clone(), Arc::new(Scheduler::new()))
            .with_dispatcher(dispatcher.clone());
        (placer, store, dispatcher)
    }

    fn pod(name: &str) -> Pod {
        Pod {
            name: name.to_string(),
            containers: vec![Container {
                name: "app".to_string(),
                image: "nginx".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn task_is_scheduled_and_dispatched() {
        let (placer, store, dispatcher) = placer_with(&[online_node("n1")]);

        let placement = placer
            .create_task(Task {
                name: "job".to_string(),
                image: "busybox".to_string(),
                ..Default::default()
            })
            .unwrap();

        assert!(placement.is_scheduled());
        let task = placement.object;
        assert!(!task.id.is_empty());
        assert_eq!(task.status, TaskStatus::Scheduled);
        assert_eq!(task.node_id.as_deref(), Some("n1"));
        assert_eq!(store.get_task(&task.id).unwrap(), task);
        assert_eq!(
            *dispatcher.sent.lock().unwrap(),
            vec![("n1".to_string(), task.id.clone())]
        );
    }

    #[test]
    fn unplaceable_task_stays_pending() {
        let (placer, store, dispatcher) = placer_with(&[]);

        let placement = placer
            .create_task(Task {
                image: "busybox".to_string(),
                ..Default::default()
            })
            .unwrap();

        assert!(placement.error.as_ref().unwrap().is_no_available_nodes());
        let stored = store.get_task(&placement.object.id).unwrap();
        assert_eq!(stored.status, TaskStatus::Pending);
        assert!(stored.node_id.is_none());
        assert!(dispatcher.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn task_without_image_is_rejected_before_storing() {
        let (placer, store, _) = placer_with(&[online_node("n1")]);
        let err = placer.create_task(Task::default()).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidWorkload(_)));
        assert!(store.list_tasks().unwrap().is_empty());
    }

    #[test]
    fn duplicate_task_id_is_a_store_error() {
        let (placer, _, _) = placer_with(&[online_node("n1")]);
        let task = Task {
            id: "fixed".to_string(),
            image: "busybox".to_string(),
            ..Default::default()
        };
        placer.create_task(task.clone()).unwrap();
        let err = placer.create_task(task).unwrap_err();
        assert!(matches!(err, SchedulerError::State(ref e) if e.is_already_exists()));
    }

    #[test]
    fn pod_defaults_namespace_and_records_schedule_time() {
        let (placer, _, _) = placer_with(&[online_node("n1")]);

        let placement = placer.create_pod(pod("web")).unwrap();
        let pod = placement.object;
        assert_eq!(pod.namespace, DEFAULT_NAMESPACE);
        assert_eq!(pod.status, PodStatus::Scheduled);
        assert!(pod.scheduled_at.is_some());
        assert!(pod.created_at > 0);
    }

    #[test]
    fn invalid_pod_is_rejected() {
        let (placer, store, _) = placer_with(&[online_node("n1")]);
        let mut bad = pod("web");
        bad.containers.clear();
        assert!(matches!(
            placer.create_pod(bad).unwrap_err(),
            SchedulerError::InvalidWorkload(_)
        ));
        assert!(store.list_pods(None).unwrap().is_empty());
    }

    #[test]
    fn placements_rotate_across_nodes() {
        let (placer, _, _) = placer_with(&[online_node("n1"), online_node("n2")]);

        let mut assigned: Vec<String> = (0..4)
            .map(|i| {
                placer
                    .create_pod(pod(&format!("web-{i}")))
                    .unwrap()
                    .object
                    .node_id
                    .unwrap()
            })
            .collect();
        assigned.sort();
        assert_eq!(assigned, vec!["n1", "n1", "n2", "n2"]);
    }
}
