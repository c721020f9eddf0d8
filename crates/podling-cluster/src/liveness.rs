//! Node liveness monitor.
//!
//! Every interval, marks online nodes whose last heartbeat is at least
//! `timeout` old as offline. A node is expired iff
//! `last_heartbeat + timeout <= now`. The offline write carries a
//! heartbeat cutoff, so a heartbeat that lands after the listing wins.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use podling_state::*;

use crate::error::ClusterResult;

/// Heartbeat age at which a node is considered gone.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Pause between sweeps.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Periodically marks stale nodes offline.
pub struct LivenessMonitor {
    store: SharedStore,
    timeout: Duration,
    interval: Duration,
}

impl LivenessMonitor {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Set the heartbeat timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the sweep interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn is_expired(&self, node: &Node, now: u64) -> bool {
        node.last_heartbeat.saturating_add(self.timeout_ms()) <= now
    }

    /// One sweep evaluated at `now` (epoch millis).
    ///
    /// Returns the IDs of nodes marked offline. Per-node failures are
    /// logged and skipped.
    pub fn sweep_at(&self, now: u64) -> ClusterResult<Vec<NodeId>> {
        let nodes = self.store.list_nodes()?;
        Ok(self.mark_expired(nodes, now))
    }

    /// Mark the expired online nodes of a listing offline.
    ///
    /// The store re-checks the heartbeat under its own lock, so nodes
    /// that heartbeated since `nodes` was read stay online.
    fn mark_expired(&self, nodes: Vec<Node>, now: u64) -> Vec<NodeId> {
        let update = NodeUpdate {
            status: Some(NodeStatus::Offline),
            heartbeat_cutoff: Some(now.saturating_sub(self.timeout_ms())),
            ..Default::default()
        };
        let mut marked = Vec::new();

        for node in nodes {
            if !node.is_online() || !self.is_expired(&node, now) {
                continue;
            }
            match self.store.update_node(&node.id, &update) {
                Ok(current) if current.is_online() => {
                    debug!(node_id = %node.id, "node heartbeated during sweep");
                }
                Ok(_) => {
                    info!(
                        node_id = %node.id,
                        last_heartbeat = node.last_heartbeat,
                        silent_ms = now.saturating_sub(node.last_heartbeat),
                        "node marked offline"
                    );
                    marked.push(node.id);
                }
                Err(e) if e.is_not_found() => {
                    debug!(node_id = %node.id, "node removed during sweep");
                }
                Err(e) => {
                    warn!(node_id = %node.id, error = %e, "failed to mark node offline");
                }
            }
        }
        marked
    }

    pub fn sweep(&self) -> ClusterResult<Vec<NodeId>> {
        self.sweep_at(epoch_millis())
    }

    /// Sweep once per interval until `shutdown` flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            timeout = ?self.timeout,
            interval = ?self.interval,
            "liveness monitor starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    match self.sweep() {
                        Ok(marked) => debug!(offline = marked.len(), "liveness sweep complete"),
                        Err(e) => error!(error = %e, "liveness sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    debug!("liveness monitor shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const NOW: u64 = 1_700_000_000_000;
    const TIMEOUT_MS: u64 = 90_000;

    fn store_with(nodes: &[(&str, NodeStatus, u64)]) -> SharedStore {
        let store: SharedStore = Arc::new(MemoryStore::new());
        for (id, status, last_heartbeat) in nodes {
            store
                .add_node(&Node {
                    id: id.to_string(),
                    hostname: "worker".to_string(),
                    port: 8081,
                    status: *status,
                    last_heartbeat: *last_heartbeat,
                    capacity: 4,
                    ..Default::default()
                })
                .unwrap();
        }
        store
    }

    #[test]
    fn exactly_at_timeout_is_offline() {
        let store = store_with(&[("n1", NodeStatus::Online, NOW - TIMEOUT_MS)]);
        let monitor = LivenessMonitor::new(store.clone());

        assert_eq!(monitor.sweep_at(NOW).unwrap(), vec!["n1".to_string()]);
        assert_eq!(store.get_node("n1").unwrap().status, NodeStatus::Offline);
    }

    #[test]
    fn just_under_timeout_stays_online() {
        let store = store_with(&[("n1", NodeStatus::Online, NOW - TIMEOUT_MS + 1)]);
        let monitor = LivenessMonitor::new(store.clone());

        assert!(monitor.sweep_at(NOW).unwrap().is_empty());
        assert!(store.get_node("n1").unwrap().is_online());
    }

    #[test]
    fn only_stale_online_nodes_are_marked() {
        let store = store_with(&[
            ("fresh", NodeStatus::Online, NOW - 1_000),
            ("stale", NodeStatus::Online, NOW - 5 * TIMEOUT_MS),
            ("gone", NodeStatus::Offline, NOW - 5 * TIMEOUT_MS),
        ]);
        let monitor = LivenessMonitor::new(store.clone());

        assert_eq!(monitor.sweep_at(NOW).unwrap(), vec!["stale".to_string()]);
        // Sweeps are idempotent and never delete.
        assert!(monitor.sweep_at(NOW).unwrap().is_empty());
        assert_eq!(store.list_nodes().unwrap().len(), 3);
    }

    #[test]
    fn custom_timeout_is_respected() {
        let store = store_with(&[("n1", NodeStatus::Online, NOW - 5_000)]);
        let monitor = LivenessMonitor::new(store).with_timeout(Duration::from_secs(5));
        assert_eq!(monitor.sweep_at(NOW).unwrap().len(), 1);
    }

    #[test]
    fn heartbeat_deadline_saturates() {
        let monitor = LivenessMonitor::new(store_with(&[])).with_timeout(Duration::MAX);
        let node = Node {
            last_heartbeat: u64::MAX - 10,
            ..Default::default()
        };
        assert!(!monitor.is_expired(&node, NOW));
    }

    #[test]
    fn heartbeat_after_listing_is_not_overwritten() {
        let store = store_with(&[("n1", NodeStatus::Online, NOW - TIMEOUT_MS)]);
        let monitor = LivenessMonitor::new(store.clone());
        let listed = store.list_nodes().unwrap();

        store
            .update_node(
                "n1",
                &NodeUpdate {
                    last_heartbeat: Some(NOW),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(monitor.mark_expired(listed, NOW).is_empty());
        assert!(store.get_node("n1").unwrap().is_online());
    }

    #[tokio::test]
    async fn run_marks_stale_nodes_and_stops_on_shutdown() {
        let store = store_with(&[("n1", NodeStatus::Online, 0)]);
        let monitor = Arc::new(
            LivenessMonitor::new(store.clone()).with_interval(Duration::from_millis(10)),
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn({
            let monitor = Arc::clone(&monitor);
            async move { monitor.run(rx).await }
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get_node("n1").unwrap().status, NodeStatus::Offline);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
