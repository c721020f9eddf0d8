//! RedbStore: redb-backed implementation of the store contract.
//!
//! Each operation runs in its own redb transaction. redb serializes write
//! transactions, so the check-then-write sequences behind `add_*`,
//! `update_*` and `delete_*` are atomic. Values are JSON-serialized into
//! `&[u8]` columns.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::store::StateStore;
use crate::tables::*;
use crate::types::*;
use crate::update::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "redb state store opened");
        Ok(store)
    }

    /// Create an ephemeral store on redb's in-memory backend.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory redb state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [TASKS, PODS, NODES, SERVICES, ENDPOINTS] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn add<T: Serialize>(&self, table: Table, kind: &'static str, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let inserted = {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            if t.get(key).map_err(map_err!(Read))?.is_some() {
                false
            } else {
                t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
                true
            }
        };
        if !inserted {
            txn.abort().map_err(map_err!(Transaction))?;
            return Err(StateError::already_exists(kind, key));
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind, %key, "object stored");
        Ok(())
    }

    fn put<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, table: Table, kind: &'static str, key: &str) -> StateResult<T> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        match t.get(key).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize)),
            None => Err(StateError::not_found(kind, key)),
        }
    }

    /// Read-modify-write inside one write transaction.
    fn modify<T, F>(&self, table: Table, kind: &'static str, key: &str, apply: F) -> StateResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated = {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            let current: Option<T> = match t.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            match current {
                Some(mut value) => {
                    apply(&mut value);
                    let bytes = serde_json::to_vec(&value).map_err(map_err!(Serialize))?;
                    t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
                    Some(value)
                }
                None => None,
            }
        };
        match updated {
            Some(value) => {
                txn.commit().map_err(map_err!(Transaction))?;
                Ok(value)
            }
            None => {
                txn.abort().map_err(map_err!(Transaction))?;
                Err(StateError::not_found(kind, key))
            }
        }
    }

    fn list<T: DeserializeOwned>(&self, table: Table) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }

    fn remove<T: DeserializeOwned>(&self, table: Table, kind: &'static str, key: &str) -> StateResult<T> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed: Option<T> = {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            match t.remove(key).map_err(map_err!(Write))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            }
        };
        match removed {
            Some(value) => {
                txn.commit().map_err(map_err!(Transaction))?;
                debug!(kind, %key, "object deleted");
                Ok(value)
            }
            None => {
                txn.abort().map_err(map_err!(Transaction))?;
                Err(StateError::not_found(kind, key))
            }
        }
    }
}

fn namespace_matches(object_ns: &str, filter: Option<&str>) -> bool {
    filter.is_none_or(|ns| effective_namespace(object_ns) == effective_namespace(ns))
}

impl StateStore for RedbStore {
    fn add_task(&self, task: &Task) -> StateResult<()> {
        self.add(TASKS, "task", &task.id, task)
    }

    fn get_task(&self, id: &str) -> StateResult<Task> {
        self.get(TASKS, "task", id)
    }

    fn update_task(&self, id: &str, update: &TaskUpdate) -> StateResult<Task> {
        self.modify(TASKS, "task", id, |t: &mut Task| update.apply(t))
    }

    fn list_tasks(&self) -> StateResult<Vec<Task>> {
        self.list(TASKS)
    }

    fn delete_task(&self, id: &str) -> StateResult<Task> {
        self.remove(TASKS, "task", id)
    }

    fn add_pod(&self, pod: &Pod) -> StateResult<()> {
        self.add(PODS, "pod", &pod.id, pod)
    }

    fn get_pod(&self, id: &str) -> StateResult<Pod> {
        self.get(PODS, "pod", id)
    }

    fn update_pod(&self, id: &str, update: &PodUpdate) -> StateResult<Pod> {
        self.modify(PODS, "pod", id, |p: &mut Pod| update.apply(p))
    }

    fn list_pods(&self, namespace: Option<&str>) -> StateResult<Vec<Pod>> {
        let pods: Vec<Pod> = self.list(PODS)?;
        Ok(pods
            .into_iter()
            .filter(|p| namespace_matches(&p.namespace, namespace))
            .collect())
    }

    fn delete_pod(&self, id: &str) -> StateResult<Pod> {
        self.remove(PODS, "pod", id)
    }

    fn add_node(&self, node: &Node) -> StateResult<()> {
        self.add(NODES, "node", &node.id, node)
    }

    fn get_node(&self, id: &str) -> StateResult<Node> {
        self.get(NODES, "node", id)
    }

    fn update_node(&self, id: &str, update: &NodeUpdate) -> StateResult<Node> {
        self.modify(NODES, "node", id, |n: &mut Node| update.apply(n))
    }

    fn list_nodes(&self) -> StateResult<Vec<Node>> {
        self.list(NODES)
    }

    fn delete_node(&self, id: &str) -> StateResult<Node> {
        self.remove(NODES, "node", id)
    }

    fn add_service(&self, service: &Service) -> StateResult<()> {
        self.add(SERVICES, "service", &service.id, service)
    }

    fn get_service(&self, id: &str) -> StateResult<Service> {
        self.get(SERVICES, "service", id)
    }

    fn update_service(&self, id: &str, update: &ServiceUpdate) -> StateResult<Service> {
        let now = epoch_millis();
        self.modify(SERVICES, "service", id, |s: &mut Service| update.apply(s, now))
    }

    fn list_services(&self, namespace: Option<&str>) -> StateResult<Vec<Service>> {
        let services: Vec<Service> = self.list(SERVICES)?;
        Ok(services
            .into_iter()
            .filter(|s| namespace_matches(&s.namespace, namespace))
            .collect())
    }

    fn delete_service(&self, id: &str) -> StateResult<Service> {
        self.remove(SERVICES, "service", id)
    }

    fn add_endpoints(&self, endpoints: &Endpoints) -> StateResult<()> {
        self.add(ENDPOINTS, "endpoints", &endpoints.service_id, endpoints)
    }

    fn get_endpoints(&self, service_id: &str) -> StateResult<Endpoints> {
        self.get(ENDPOINTS, "endpoints", service_id)
    }

    fn set_endpoints(&self, endpoints: &Endpoints) -> StateResult<()> {
        self.put(ENDPOINTS, &endpoints.service_id, endpoints)
    }

    fn list_endpoints(&self, namespace: Option<&str>) -> StateResult<Vec<Endpoints>> {
        let all: Vec<Endpoints> = self.list(ENDPOINTS)?;
        Ok(all
            .into_iter()
            .filter(|e| namespace_matches(&e.namespace, namespace))
            .collect())
    }

    fn delete_endpoints(&self, service_id: &str) -> StateResult<Endpoints> {
        self.remove(ENDPOINTS, "endpoints", service_id)
    }
}
