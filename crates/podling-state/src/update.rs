//! Partial update records.
//!
//! Every field is optional; `None` leaves the stored value untouched.
//! Backends apply a record to their own copy inside one critical section
//! (a write lock or a redb write transaction), so readers never observe a
//! half-applied update.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::*;

/// Partial update for a [`Task`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub node_id: Option<NodeId>,
    pub container_id: Option<String>,
    pub health: Option<HealthStatus>,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    pub error: Option<String>,
}

impl TaskUpdate {
    pub fn apply(&self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(node_id) = &self.node_id {
            task.node_id = Some(node_id.clone());
        }
        if let Some(container_id) = &self.container_id {
            task.container_id = Some(container_id.clone());
        }
        if let Some(health) = self.health {
            task.health = health;
        }
        if let Some(ts) = self.started_at {
            task.started_at = Some(ts);
        }
        if let Some(ts) = self.finished_at {
            task.finished_at = Some(ts);
        }
        if let Some(error) = &self.error {
            task.error = Some(error.clone());
        }
    }
}

/// Partial update for a [`Pod`].
///
/// `annotations` are merged into the existing map; `labels` and
/// `containers` replace it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodUpdate {
    pub status: Option<PodStatus>,
    pub node_id: Option<NodeId>,
    pub containers: Option<Vec<Container>>,
    pub labels: Option<HashMap<String, String>>,
    pub annotations: Option<HashMap<String, String>>,
    pub scheduled_at: Option<u64>,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    pub message: Option<String>,
}

impl PodUpdate {
    pub fn apply(&self, pod: &mut Pod) {
        if let Some(status) = self.status {
            pod.status = status;
        }
        if let Some(node_id) = &self.node_id {
            pod.node_id = Some(node_id.clone());
        }
        if let Some(containers) = &self.containers {
            pod.containers = containers.clone();
        }
        if let Some(labels) = &self.labels {
            pod.labels = labels.clone();
        }
        if let Some(annotations) = &self.annotations {
            pod.annotations
                .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(ts) = self.scheduled_at {
            pod.scheduled_at = Some(ts);
        }
        if let Some(ts) = self.started_at {
            pod.started_at = Some(ts);
        }
        if let Some(ts) = self.finished_at {
            pod.finished_at = Some(ts);
        }
        if let Some(message) = &self.message {
            pod.message = Some(message.clone());
        }
    }
}

/// Partial update for a [`Node`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeUpdate {
    pub status: Option<NodeStatus>,
    pub last_heartbeat: Option<u64>,
    pub running_tasks: Option<u32>,
    pub capacity: Option<u32>,
    pub resources: Option<NodeResources>,
    /// Replaces only the `used` part of the resource block. Ignored for
    /// nodes that advertise no resource block.
    pub used: Option<ResourceList>,
    pub labels: Option<HashMap<String, String>>,
    /// Apply only if the stored heartbeat is no later than this instant.
    pub heartbeat_cutoff: Option<u64>,
}

impl NodeUpdate {
    pub fn apply(&self, node: &mut Node) {
        if self.heartbeat_cutoff.is_some_and(|cutoff| node.last_heartbeat > cutoff) {
            return;
        }
        if let Some(status) = self.status {
            node.status = status;
        }
        if let Some(ts) = self.last_heartbeat {
            node.last_heartbeat = ts;
        }
        if let Some(running) = self.running_tasks {
            node.running_tasks = running;
        }
        if let Some(capacity) = self.capacity {
            node.capacity = capacity;
        }
        if let Some(resources) = self.resources {
            node.resources = Some(resources);
        }
        if let (Some(used), Some(resources)) = (self.used, node.resources.as_mut()) {
            resources.used = used;
        }
        if let Some(labels) = &self.labels {
            node.labels = labels.clone();
        }
    }
}

/// Partial update for a [`Service`].
///
/// The ClusterIP and service type are fixed at creation and cannot be
/// changed through an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceUpdate {
    pub selector: Option<HashMap<String, String>>,
    pub ports: Option<Vec<ServicePort>>,
    pub labels: Option<HashMap<String, String>>,
    pub annotations: Option<HashMap<String, String>>,
    pub session_affinity: Option<SessionAffinity>,
}

impl ServiceUpdate {
    pub fn apply(&self, service: &mut Service, now: u64) {
        if let Some(selector) = &self.selector {
            service.selector = selector.clone();
        }
        if let Some(ports) = &self.ports {
            service.ports = ports.clone();
        }
        if let Some(labels) = &self.labels {
            service.labels = labels.clone();
        }
        if let Some(annotations) = &self.annotations {
            service
                .annotations
                .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(affinity) = self.session_affinity {
            service.session_affinity = affinity;
        }
        service.updated_at = now;
    }
}
