//! MemoryStore: the reference in-memory backend.
//!
//! One `RwLock` guards an ID-ordered map per entity type. Reads take the shared mode,
//! writes the exclusive mode, and every value handed out is a clone.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::store::StateStore;
use crate::types::*;
use crate::update::*;

#[derive(Default)]
struct Maps {
    tasks: BTreeMap<String, Task>,
    pods: BTreeMap<String, Pod>,
    nodes: BTreeMap<String, Node>,
    services: BTreeMap<String, Service>,
    endpoints: BTreeMap<String, Endpoints>,
}

/// Thread-safe in-memory state store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Maps>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Mutations are single inserts, removes or in-place applies, so a
    // poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, Maps> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Maps> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn insert_new<T: Clone>(
    map: &mut BTreeMap<String, T>,
    kind: &'static str,
    id: &str,
    value: &T,
) -> StateResult<()> {
    match map.entry(id.to_string()) {
        Entry::Occupied(_) => Err(StateError::already_exists(kind, id)),
        Entry::Vacant(slot) => {
            slot.insert(value.clone());
            Ok(())
        }
    }
}

fn get_cloned<T: Clone>(map: &BTreeMap<String, T>, kind: &'static str, id: &str) -> StateResult<T> {
    map.get(id)
        .cloned()
        .ok_or_else(|| StateError::not_found(kind, id))
}

fn remove<T>(map: &mut BTreeMap<String, T>, kind: &'static str, id: &str) -> StateResult<T> {
    map.remove(id).ok_or_else(|| StateError::not_found(kind, id))
}

fn in_namespace(object_ns: &str, filter: Option<&str>) -> bool {
    filter.is_none_or(|ns| effective_namespace(object_ns) == effective_namespace(ns))
}

impl StateStore for MemoryStore {
    // ── Tasks ──────────────────────────────────────────────────────

    fn add_task(&self, task: &Task) -> StateResult<()> {
        insert_new(&mut self.write().tasks, "task", &task.id, task)?;
        debug!(task_id = %task.id, "task stored");
        Ok(())
    }

    fn get_task(&self, id: &str) -> StateResult<Task> {
        get_cloned(&self.read().tasks, "task", id)
    }

    fn update_task(&self, id: &str, update: &TaskUpdate) -> StateResult<Task> {
        let mut maps = self.write();
        let task = maps
            .tasks
            .get_mut(id)
            .ok_or_else(|| StateError::not_found("task", id))?;
        update.apply(task);
        Ok(task.clone())
    }

    fn list_tasks(&self) -> StateResult<Vec<Task>> {
        Ok(self.read().tasks.values().cloned().collect())
    }

    fn delete_task(&self, id: &str) -> StateResult<Task> {
        remove(&mut self.write().tasks, "task", id)
    }

    // ── Pods ───────────────────────────────────────────────────────

    fn add_pod(&self, pod: &Pod) -> StateResult<()> {
        insert_new(&mut self.write().pods, "pod", &pod.id, pod)?;
        debug!(pod_id = %pod.id, namespace = %pod.namespace, "pod stored");
        Ok(())
    }

    fn get_pod(&self, id: &str) -> StateResult<Pod> {
        get_cloned(&self.read().pods, "pod", id)
    }

    fn update_pod(&self, id: &str, update: &PodUpdate) -> StateResult<Pod> {
        let mut maps = self.write();
        let pod = maps
            .pods
            .get_mut(id)
            .ok_or_else(|| StateError::not_found("pod", id))?;
        update.apply(pod);
        Ok(pod.clone())
    }

    fn list_pods(&self, namespace: Option<&str>) -> StateResult<Vec<Pod>> {
        Ok(self
            .read()
            .pods
            .values()
            .filter(|p| in_namespace(&p.namespace, namespace))
            .cloned()
            .collect())
    }

    fn delete_pod(&self, id: &str) -> StateResult<Pod> {
        remove(&mut self.write().pods, "pod", id)
    }

    // ── Nodes ──────────────────────────────────────────────────────

    fn add_node(&self, node: &Node) -> StateResult<()> {
        insert_new(&mut self.write().nodes, "node", &node.id, node)?;
        debug!(node_id = %node.id, "node stored");
        Ok(())
    }

    fn get_node(&self, id: &str) -> StateResult<Node> {
        get_cloned(&self.read().nodes, "node", id)
    }

    fn update_node(&self, id: &str, update: &NodeUpdate) -> StateResult<Node> {
        let mut maps = self.write();
        let node = maps
            .nodes
            .get_mut(id)
            .ok_or_else(|| StateError::not_found("node", id))?;
        update.apply(node);
        Ok(node.clone())
    }

    fn list_nodes(&self) -> StateResult<Vec<Node>> {
        Ok(self.read().nodes.values().cloned().collect())
    }

    fn delete_node(&self, id: &str) -> StateResult<Node> {
        remove(&mut self.write().nodes, "node", id)
    }

    fn get_available_nodes(&self) -> StateResult<Vec<Node>> {
        Ok(self
            .read()
            .nodes
            .values()
            .filter(|n| n.is_online() && n.has_free_slot())
            .cloned()
            .collect())
    }

    // ── Services ───────────────────────────────────────────────────

    fn add_service(&self, service: &Service) -> StateResult<()> {
        insert_new(&mut self.write().services, "service", &service.id, service)?;
        debug!(service_id = %service.id, "service stored");
        Ok(())
    }

    fn get_service(&self, id: &str) -> StateResult<Service> {
        get_cloned(&self.read().services, "service", id)
    }

    fn update_service(&self, id: &str, update: &ServiceUpdate) -> StateResult<Service> {
        let mut maps = self.write();
        let service = maps
            .services
            .get_mut(id)
            .ok_or_else(|| StateError::not_found("service", id))?;
        update.apply(service, epoch_millis());
        Ok(service.clone())
    }

    fn list_services(&self, namespace: Option<&str>) -> StateResult<Vec<Service>> {
        Ok(self
            .read()
            .services
            .values()
            .filter(|s| in_namespace(&s.namespace, namespace))
            .cloned()
            .collect())
    }

    fn delete_service(&self, id: &str) -> StateResult<Service> {
        remove(&mut self.write().services, "service", id)
    }

    // ── Endpoints ──────────────────────────────────────────────────

    fn add_endpoints(&self, endpoints: &Endpoints) -> StateResult<()> {
        insert_new(
            &mut self.write().endpoints,
            "endpoints",
            &endpoints.service_id,
            endpoints,
        )
    }

    fn get_endpoints(&self, service_id: &str) -> StateResult<Endpoints> {
        get_cloned(&self.read().endpoints, "endpoints", service_id)
    }

    fn set_endpoints(&self, endpoints: &Endpoints) -> StateResult<()> {
        self.write()
            .endpoints
            .insert(endpoints.service_id.clone(), endpoints.clone());
        Ok(())
    }

    fn list_endpoints(&self, namespace: Option<&str>) -> StateResult<Vec<Endpoints>> {
        Ok(self
            .read()
            .endpoints
            .values()
            .filter(|e| in_namespace(&e.namespace, namespace))
            .cloned()
            .collect())
    }

    fn delete_endpoints(&self, service_id: &str) -> StateResult<Endpoints> {
        remove(&mut self.write().endpoints, "endpoints", service_id)
    }
}
