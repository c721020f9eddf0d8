//! Endpoint controller: service lifecycle and endpoint reconciliation.
//!
//! `EndpointController` reads services and pods from the state store and
//! rewrites each service's `Endpoints` record in full. It runs one pass
//! immediately when started and one per interval after that, and also
//! reconciles a service right after creating it. Each pass also drops
//! endpoint records left behind by deleted services.
//!
//! A pod backs a service when its namespace matches and its labels contain
//! the service selector. Among those:
//! - pods that are not running, not bound to a node, or have no published
//!   pod IP are left out entirely
//! - pods whose containers are all ready become ready addresses
//! - the rest become not-ready addresses

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use podling_state::*;

use crate::allocator::{ClusterIpAllocator, Ipv4Cidr};
use crate::error::{EndpointError, EndpointResult};

/// Default pause between reconciliation passes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Statistics for one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub services_synced: u32,
    /// Services with an empty selector.
    pub services_skipped: u32,
    pub ready_addresses: u32,
    pub not_ready_addresses: u32,
    /// Endpoint records removed because their service is gone.
    pub orphans_removed: u32,
    pub errors: u32,
}

/// Owns the ClusterIP pool and keeps endpoint records in step with pods.
pub struct EndpointController {
    store: SharedStore,
    allocator: ClusterIpAllocator,
    interval: Duration,
}

impl EndpointController {
    pub fn new(store: SharedStore, cidr: Ipv4Cidr, interval: Duration) -> Self {
        Self {
            store,
            allocator: ClusterIpAllocator::new(cidr),
            interval,
        }
    }

    pub fn allocator(&self) -> &ClusterIpAllocator {
        &self.allocator
    }

    /// Validate, persist and immediately reconcile a new service.
    ///
    /// `ClusterIP` services receive an address from the pool; any
    /// `cluster_ip` in the request is ignored. If persisting fails the
    /// address goes back to the pool.
    pub fn create_service(&self, mut service: Service) -> EndpointResult<Service> {
        service.validate().map_err(EndpointError::InvalidService)?;
        if service.id.is_empty() {
            service.id = Uuid::new_v4().to_string();
        }
        if service.namespace.is_empty() {
            service.namespace = DEFAULT_NAMESPACE.to_string();
        }
        let now = epoch_millis();
        service.created_at = now;
        service.updated_at = now;

        let cluster_ip = match service.service_type {
            ServiceType::ClusterIp => Some(self.allocator.allocate()?),
            ServiceType::NodePort | ServiceType::LoadBalancer => None,
        };
        service.cluster_ip = cluster_ip.map(|ip| ip.to_string());

        if let Err(e) = self.store.add_service(&service) {
            if let Some(ip) = cluster_ip {
                if let Err(release_err) = self.allocator.release(ip) {
                    error!(%ip, error = %release_err, "failed to release cluster IP after aborted create");
                }
            }
            return Err(e.into());
        }

        info!(
            service_id = %service.id,
            name = %service.name,
            namespace = %service.namespace,
            cluster_ip = service.cluster_ip.as_deref().unwrap_or("none"),
            "service created"
        );

        if let Err(e) = self.reconcile_service(&service) {
            warn!(service_id = %service.id, error = %e, "initial endpoint sync failed");
        }
        Ok(service)
    }

    /// Delete a service, release its ClusterIP and drop its endpoints.
    pub fn delete_service(&self, id: &str) -> EndpointResult<Service> {
        let service = self.store.delete_service(id)?;

        if let Some(raw) = service.cluster_ip.as_deref() {
            match raw.parse::<Ipv4Addr>() {
                Ok(ip) => {
                    if let Err(e) = self.allocator.release(ip) {
                        warn!(service_id = %id, %ip, error = %e, "cluster IP not held by the pool");
                    }
                }
                Err(_) => {
                    warn!(service_id = %id, cluster_ip = %raw, "unparseable cluster IP on deleted service")
                }
            }
        }

        match self.store.delete_endpoints(id) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                debug!(service_id = %id, "service had no endpoints record")
            }
            Err(e) => warn!(service_id = %id, error = %e, "failed to delete endpoints record"),
        }

        info!(service_id = %id, name = %service.name, "service deleted");
        Ok(service)
    }

    /// Reserve the ClusterIPs of services already in the store.
    ///
    /// Returns the number of addresses reserved.
    pub fn restore_allocations(&self) -> EndpointResult<usize> {
        let mut restored = 0;
        for service in self.store.list_services(None)? {
            let Some(raw) = service.cluster_ip.as_deref() else {
                continue;
            };
            let reserved = raw
                .parse::<Ipv4Addr>()
                .map_err(|_| EndpointError::InvalidAddress(raw.to_string()))
                .and_then(|ip| self.allocator.reserve(ip));
            match reserved {
                Ok(true) => restored += 1,
                Ok(false) => {
                    warn!(service_id = %service.id, cluster_ip = %raw, "cluster IP shared by several services")
                }
                Err(e) => warn!(service_id = %service.id, error = %e, "cannot restore cluster IP"),
            }
        }
        if restored > 0 {
            info!(restored, cidr = %self.allocator.cidr(), "cluster IP allocations restored");
        }
        Ok(restored)
    }

    /// Recompute and store the endpoints of one service.
    pub fn reconcile_service(&self, service: &Service) -> EndpointResult<Endpoints> {
        let pods = self
            .store
            .list_pods_by_labels(effective_namespace(&service.namespace), &service.selector)?;
        let endpoints = compute_endpoints(service, &pods, epoch_millis());
        self.store.set_endpoints(&endpoints)?;
        Ok(endpoints)
    }

    /// One pass over every service.
    ///
    /// A failure on one service is logged and counted; the pass continues.
    pub fn reconcile_all(&self) -> EndpointResult<SyncStats> {
        let services = self.store.list_services(None)?;
        let mut stats = SyncStats::default();

        for service in &services {
            if service.selector.is_empty() {
                stats.services_skipped += 1;
                continue;
            }
            match self.reconcile_service(service) {
                Ok(endpoints) => {
                    stats.services_synced += 1;
                    for subset in &endpoints.subsets {
                        stats.ready_addresses += subset.addresses.len() as u32;
                        stats.not_ready_addresses += subset.not_ready_addresses.len() as u32;
                    }
                }
                Err(e) => {
                    stats.errors += 1;
                    warn!(service_id = %service.id, error = %e, "endpoint sync failed");
                }
            }
        }

        let listed: HashSet<&str> = services.iter().map(|s| s.id.as_str()).collect();
        match self.remove_orphans(&listed) {
            Ok(removed) => stats.orphans_removed = removed,
            Err(e) => {
                stats.errors += 1;
                warn!(error = %e, "orphaned endpoint cleanup failed");
            }
        }

        debug!(
            services = stats.services_synced,
            skipped = stats.services_skipped,
            ready = stats.ready_addresses,
            not_ready = stats.not_ready_addresses,
            orphans = stats.orphans_removed,
            errors = stats.errors,
            "endpoint sync complete"
        );
        Ok(stats)
    }

    /// Delete endpoint records whose service no longer exists.
    ///
    /// A record whose service is missing from `listed` is only dropped
    /// after the store confirms the service is gone, so services created
    /// during the pass keep their endpoints.
    fn remove_orphans(&self, listed: &HashSet<&str>) -> EndpointResult<u32> {
        let mut removed = 0;
        for endpoints in self.store.list_endpoints(None)? {
            let id = endpoints.service_id.as_str();
            if listed.contains(id) {
                continue;
            }
            match self.store.get_service(id) {
                Ok(_) => continue,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
            match self.store.delete_endpoints(id) {
                Ok(_) => {
                    removed += 1;
                    info!(service_id = %id, "orphaned endpoints removed");
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    /// Reconcile now, then once per interval until `shutdown` flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "endpoint controller starting");
        self.pass();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => self.pass(),
                _ = shutdown.changed() => {
                    debug!("endpoint controller shutting down");
                    break;
                }
            }
        }
    }

    fn pass(&self) {
        if let Err(e) = self.reconcile_all() {
            error!(error = %e, "endpoint sync pass failed");
        }
    }
}

/// Build the endpoints record of `service` from candidate `pods`.
///
/// `pods` must already be filtered by namespace and selector.
pub fn compute_endpoints(service: &Service, pods: &[Pod], now: u64) -> Endpoints {
    let mut addresses = Vec::new();
    let mut not_ready_addresses = Vec::new();

    for pod in pods {
        if pod.status != PodStatus::Running {
            continue;
        }
        let (Some(node_id), Some(ip)) = (pod.node_id.as_ref(), pod.pod_ip()) else {
            continue;
        };
        let address = EndpointAddress {
            ip: ip.to_string(),
            pod_id: pod.id.clone(),
            node_id: node_id.clone(),
        };
        if pod.is_ready() {
            addresses.push(address);
        } else {
            not_ready_addresses.push(address);
        }
    }

    addresses.sort_by(|a, b| a.pod_id.cmp(&b.pod_id));
    not_ready_addresses.sort_by(|a, b| a.pod_id.cmp(&b.pod_id));

    let subsets = if addresses.is_empty() && not_ready_addresses.is_empty() {
        Vec::new()
    } else {
        vec![EndpointSubset {
            addresses,
            not_ready_addresses,
            ports: service
                .ports
                .iter()
                .map(|p| EndpointPort {
                    name: p.name.clone(),
                    port: p.effective_target_port(),
                    protocol: p.protocol,
                })
                .collect(),
        }]
    };

    Endpoints {
        service_id: service.id.clone(),
        service_name: service.name.clone(),
        namespace: effective_namespace(&service.namespace).to_string(),
        subsets,
        updated_at: now,
    }
}
