//! Domain types for the Podling state store.
//!
//! These types represent tasks, pods, nodes, services and endpoint sets.
//! All types serialize to/from JSON, which is both the REST wire format
//! and the value encoding of the redb backend. Timestamps are Unix epoch
//! milliseconds.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Unique identifier for a task.
pub type TaskId = String;

/// Unique identifier for a pod.
pub type PodId = String;

/// Unique identifier for a node in the cluster.
pub type NodeId = String;

/// Unique identifier for a service.
pub type ServiceId = String;

/// Namespace assumed when a pod or service does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Annotation key under which a worker publishes a pod's runtime IP.
pub const POD_IP_ANNOTATION: &str = "podling.io/pod-ip";

/// Resolve an empty namespace to [`DEFAULT_NAMESPACE`].
pub fn effective_namespace(namespace: &str) -> &str {
    if namespace.is_empty() {
        DEFAULT_NAMESPACE
    } else {
        namespace
    }
}

/// True if `labels` contains every key/value pair of `selector`.
///
/// An empty selector matches everything.
pub fn labels_match(labels: &HashMap<String, String>, selector: &HashMap<String, String>) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|lv| lv == v))
}

/// Current Unix epoch in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ── Resources ─────────────────────────────────────────────────────

/// A CPU/memory quantity pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceList {
    /// CPU in millicores (1000 = one core).
    pub cpu: u64,
    /// Memory in bytes.
    pub memory: u64,
}

impl ResourceList {
    pub const fn new(cpu: u64, memory: u64) -> Self {
        Self { cpu, memory }
    }

    pub fn is_zero(&self) -> bool {
        self.cpu == 0 && self.memory == 0
    }

    pub fn saturating_add(self, other: ResourceList) -> ResourceList {
        ResourceList {
            cpu: self.cpu.saturating_add(other.cpu),
            memory: self.memory.saturating_add(other.memory),
        }
    }

    pub fn saturating_sub(self, other: ResourceList) -> ResourceList {
        ResourceList {
            cpu: self.cpu.saturating_sub(other.cpu),
            memory: self.memory.saturating_sub(other.memory),
        }
    }
}

/// Requested and limited resources for a workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequirements {
    pub requests: ResourceList,
    pub limits: ResourceList,
}

/// Resource accounting block advertised by a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeResources {
    pub capacity: ResourceList,
    pub allocatable: ResourceList,
    pub used: ResourceList,
}

impl NodeResources {
    /// Resources still available for placement (`allocatable - used`).
    pub fn free(&self) -> ResourceList {
        self.allocatable.saturating_sub(self.used)
    }

    /// True if `allocatable - used >= requested` in both dimensions.
    ///
    /// Zero requests always fit.
    pub fn can_fit(&self, requested: &ResourceList) -> bool {
        if requested.is_zero() {
            return true;
        }
        let free = self.free();
        self.allocatable.cpu >= self.used.cpu
            && self.allocatable.memory >= self.used.memory
            && free.cpu >= requested.cpu
            && free.memory >= requested.memory
    }
}

// ── Shared enums ──────────────────────────────────────────────────

/// Health status as reported by a worker's probes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    #[default]
    Unknown,
}

/// Restart policy carried to the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    Always,
    OnFailure,
    #[default]
    Never,
}

/// A per-container health check. Executed by workers, stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    pub handler: ProbeHandler,
    #[serde(default)]
    pub initial_delay_seconds: u32,
    #[serde(default = "default_period_seconds")]
    pub period_seconds: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
    #[serde(default = "default_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

/// How a probe checks the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeHandler {
    HttpGet { path: String, port: u16 },
    TcpSocket { port: u16 },
    Exec { command: Vec<String> },
}

fn default_period_seconds() -> u32 {
    10
}

fn default_timeout_seconds() -> u32 {
    1
}

fn default_threshold() -> u32 {
    1
}

fn default_failure_threshold() -> u32 {
    3
}

// ── Task ──────────────────────────────────────────────────────────

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Completed and failed tasks never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A single-container unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    /// Container image reference.
    pub image: String,
    pub env: HashMap<String, String>,
    pub status: TaskStatus,
    /// Node the task was placed on.
    pub node_id: Option<NodeId>,
    /// Runtime container ID reported by the worker.
    pub container_id: Option<String>,
    pub liveness_probe: Option<Probe>,
    pub readiness_probe: Option<Probe>,
    pub restart_policy: RestartPolicy,
    pub resources: ResourceRequirements,
    pub health: HealthStatus,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    /// Last error message reported for this task.
    pub error: Option<String>,
}

// ── Pod ───────────────────────────────────────────────────────────

/// Lifecycle status of a pod.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodStatus {
    #[default]
    Pending,
    Scheduled,
    Running,
    Succeeded,
    Failed,
}

impl PodStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Per-container runtime status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    #[default]
    Waiting,
    Running,
    Terminated,
}

/// Transport protocol of a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

/// A port a container listens on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerPort {
    pub name: Option<String>,
    pub container_port: u16,
    pub protocol: Protocol,
}

/// A container embedded in a pod.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    pub name: String,
    pub image: String,
    pub env: HashMap<String, String>,
    pub ports: Vec<ContainerPort>,
    pub resources: ResourceRequirements,
    pub status: ContainerStatus,
    pub exit_code: Option<i32>,
    pub container_id: Option<String>,
    pub health: HealthStatus,
    pub liveness_probe: Option<Probe>,
    pub readiness_probe: Option<Probe>,
}

impl Container {
    /// Running, and healthy if a readiness probe is configured.
    pub fn is_ready(&self) -> bool {
        self.status == ContainerStatus::Running
            && (self.readiness_probe.is_none() || self.health == HealthStatus::Healthy)
    }
}

/// A multi-container unit of work sharing one lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pod {
    pub id: PodId,
    pub name: String,
    pub namespace: String,
    pub labels: HashMap<String, String>,
    /// Out-of-band metadata; workers publish [`POD_IP_ANNOTATION`] here.
    pub annotations: HashMap<String, String>,
    pub containers: Vec<Container>,
    pub status: PodStatus,
    pub node_id: Option<NodeId>,
    pub restart_policy: RestartPolicy,
    pub created_at: u64,
    pub scheduled_at: Option<u64>,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    /// Human-readable reason for the current status.
    pub message: Option<String>,
}

impl Pod {
    /// Resource requests summed across all containers.
    pub fn total_requests(&self) -> ResourceList {
        self.containers
            .iter()
            .fold(ResourceList::default(), |acc, c| {
                acc.saturating_add(c.resources.requests)
            })
    }

    /// Runtime IP published by the worker, if any.
    pub fn pod_ip(&self) -> Option<&str> {
        self.annotations.get(POD_IP_ANNOTATION).map(String::as_str)
    }

    /// Pod is running and every container is ready.
    pub fn is_ready(&self) -> bool {
        self.status == PodStatus::Running && self.containers.iter().all(Container::is_ready)
    }

    /// Check the structural invariants of a pod definition.
    ///
    /// Returns a description of the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("pod name is required".to_string());
        }
        if self.containers.is_empty() {
            return Err("pod must have at least one container".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for container in &self.containers {
            if container.name.is_empty() {
                return Err("container name is required".to_string());
            }
            if container.image.is_empty() {
                return Err(format!("container {} has no image", container.name));
            }
            if !seen.insert(container.name.as_str()) {
                return Err(format!("duplicate container name: {}", container.name));
            }
        }
        Ok(())
    }
}

// ── Node ──────────────────────────────────────────────────────────

/// Reachability status of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Online,
    Offline,
}

/// A worker machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub id: NodeId,
    pub hostname: String,
    pub port: u16,
    pub status: NodeStatus,
    /// Epoch millis of the last heartbeat.
    pub last_heartbeat: u64,
    pub running_tasks: u32,
    /// Legacy maximum number of concurrent task slots.
    pub capacity: u32,
    /// Structured resource accounting, when the node advertises it.
    pub resources: Option<NodeResources>,
    pub labels: HashMap<String, String>,
}

impl Node {
    /// `hostname:port` for reaching the node's worker API.
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }

    /// True if the legacy slot limit leaves room for another workload.
    pub fn has_free_slot(&self) -> bool {
        self.running_tasks < self.capacity
    }
}

// ── Service ───────────────────────────────────────────────────────

/// How a service is exposed. Only `ClusterIP` allocates a virtual IP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    #[default]
    #[serde(rename = "ClusterIP")]
    ClusterIp,
    NodePort,
    LoadBalancer,
}

/// Session affinity hint for service consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionAffinity {
    #[default]
    None,
    #[serde(rename = "ClientIP")]
    ClientIp,
}

/// A service port mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicePort {
    pub name: Option<String>,
    /// Port the service is reached on.
    pub port: u16,
    /// Port dialed on the pod; 0 means the same as `port`.
    pub target_port: u16,
    pub protocol: Protocol,
}

impl ServicePort {
    pub fn effective_target_port(&self) -> u16 {
        if self.target_port == 0 {
            self.port
        } else {
            self.target_port
        }
    }
}

/// A stable name and virtual IP fronting a set of pods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    /// Virtual IP, set for `ClusterIP` services.
    pub cluster_ip: Option<String>,
    /// Pods whose labels contain all of these pairs back the service.
    pub selector: HashMap<String, String>,
    pub ports: Vec<ServicePort>,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub session_affinity: SessionAffinity,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Service {
    /// Check creation-time invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("service name is required".to_string());
        }
        if self.selector.is_empty() {
            return Err("service selector is required".to_string());
        }
        if self.ports.is_empty() {
            return Err("service must expose at least one port".to_string());
        }
        if let Some(port) = self.ports.iter().find(|p| p.port == 0) {
            return Err(format!(
                "service port {} must be nonzero",
                port.name.as_deref().unwrap_or("<unnamed>")
            ));
        }
        Ok(())
    }
}

// ── Endpoints ─────────────────────────────────────────────────────

/// One backing pod of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAddress {
    pub ip: String,
    pub pod_id: PodId,
    pub node_id: NodeId,
}

/// A port exposed by the backing pods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPort {
    pub name: Option<String>,
    pub port: u16,
    pub protocol: Protocol,
}

/// Addresses sharing one port list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSubset {
    pub addresses: Vec<EndpointAddress>,
    pub not_ready_addresses: Vec<EndpointAddress>,
    pub ports: Vec<EndpointPort>,
}

/// Resolved addresses backing a service. Keyed by service ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub service_id: ServiceId,
    pub service_name: String,
    pub namespace: String,
    pub subsets: Vec<EndpointSubset>,
    pub updated_at: u64,
}
