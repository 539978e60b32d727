//! StateStore: redb-backed state persistence for dockgrid.
//!
//! Provides typed operations over services, instances, host nodes and
//! registry credentials. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).
//!
//! Read-modify-write operations (`begin_deploy`, `soft_delete_instance`,
//! `purge_unstarted_instances`, ...) run inside a single write transaction.
//! redb serializes write transactions, which gives them compare-and-set
//! semantics across concurrent callers.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult, StorageOp};
use crate::tables::*;
use crate::types::*;

/// Closure turning a redb error into a `StateError` tagged with the failed step.
macro_rules! map_err {
    (Open) => {
        |e| StateError::Open(e.to_string())
    };
    ($op:ident) => {
        |e| StateError::Storage {
            op: StorageOp::$op,
            message: e.to_string(),
        }
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SERVICES).map_err(map_err!(Table))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(REGISTRIES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Services ───────────────────────────────────────────────────

    /// Insert or update a service.
    ///
    /// The deployer addresses a service by `id`, so it must be the
    /// `{grid}/{name}` key the record is stored under.
    pub fn put_service(&self, service: &Service) -> StateResult<()> {
        let key = service.table_key();
        if service.id != key {
            return Err(StateError::KeyMismatch {
                id: service.id.clone(),
                key,
            });
        }
        self.put_value(SERVICES, &key, service)?;
        debug!(%key, "service stored");
        Ok(())
    }

    /// Get a service by `{grid}/{name}` key.
    pub fn get_service(&self, key: &str) -> StateResult<Option<Service>> {
        self.get_value(SERVICES, key)
    }

    /// Current lifecycle state of a service, read atomically.
    pub fn service_state(&self, key: &str) -> StateResult<Option<ServiceState>> {
        Ok(self.get_service(key)?.map(|s| s.state))
    }

    /// Atomically move a service into `deploying` and stamp `deployed_at`.
    ///
    /// Returns `false` without writing when a rollout is already in flight.
    pub fn begin_deploy(&self, key: &str, now: u64) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let started;
        {
            let mut table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            let current = table
                .get(key)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| StateError::NotFound(key.to_string()))?;
            let mut service: Service = serde_json::from_slice(&current)?;

            started = !service.is_deploying();
            if started {
                service.state = ServiceState::Deploying;
                service.deployed_at = Some(now);
                service.updated_at = now;
                let value = serde_json::to_vec(&service)?;
                table
                    .insert(key, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, started, "begin deploy");
        Ok(started)
    }

    /// Atomically set a service's lifecycle state.
    pub fn set_service_state(&self, key: &str, state: ServiceState) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            let current = table
                .get(key)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| StateError::NotFound(key.to_string()))?;
            let mut service: Service = serde_json::from_slice(&current)?;
            service.state = state;
            service.updated_at = epoch_secs();
            let value = serde_json::to_vec(&service)?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, ?state, "service state set");
        Ok(())
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Insert or update an instance record.
    pub fn put_instance(&self, instance: &Instance) -> StateResult<()> {
        self.put_value(INSTANCES, &instance.table_key(), instance)
    }

    /// Get an instance by its composite key.
    pub fn get_instance(&self, key: &str) -> StateResult<Option<Instance>> {
        self.get_value(INSTANCES, key)
    }

    /// All instance records of a service, including soft-deleted ones.
    pub fn list_instances_for_service(&self, service_id: &str) -> StateResult<Vec<Instance>> {
        self.scan_prefix(INSTANCES, &format!("{service_id}:"))
    }

    /// Instances of a service that have not been soft-deleted.
    pub fn list_live_instances(&self, service_id: &str) -> StateResult<Vec<Instance>> {
        let mut live = self.list_instances_for_service(service_id)?;
        live.retain(Instance::is_live);
        Ok(live)
    }

    /// Live instances whose `deploy_rev` differs from `deploy_rev`.
    pub fn list_stale_instances(
        &self,
        service_id: &str,
        deploy_rev: &str,
    ) -> StateResult<Vec<Instance>> {
        let mut stale = self.list_live_instances(service_id)?;
        stale.retain(|i| i.deploy_rev != deploy_rev);
        Ok(stale)
    }

    /// Live instance of a service with the given ordinal and revision.
    pub fn find_instance(
        &self,
        service_id: &str,
        instance_number: u32,
        deploy_rev: &str,
    ) -> StateResult<Option<Instance>> {
        Ok(self
            .list_live_instances(service_id)?
            .into_iter()
            .find(|i| i.instance_number == instance_number && i.deploy_rev == deploy_rev))
    }

    /// Mark an instance as deleted. Idempotent: an existing marker is kept.
    ///
    /// Returns true if this call set the marker.
    pub fn soft_delete_instance(&self, key: &str, now: u64) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let marked;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let current = table
                .get(key)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| StateError::NotFound(key.to_string()))?;
            let mut instance: Instance = serde_json::from_slice(&current)?;

            marked = instance.deleted_at.is_none();
            if marked {
                instance.deleted_at = Some(now);
                instance.updated_at = now;
                let value = serde_json::to_vec(&instance)?;
                table
                    .insert(key, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(marked)
    }

    /// Hard-delete instance records of a stale revision that never got an
    /// execution identity. Soft-deleted records are included.
    ///
    /// Returns the number of records erased.
    pub fn purge_unstarted_instances(&self, service_id: &str, deploy_rev: &str) -> StateResult<u32> {
        let prefix = format!("{service_id}:");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let mut doomed = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                if !key.value().starts_with(&prefix) {
                    continue;
                }
                let instance: Instance = serde_json::from_slice(value.value())?;
                if instance.container_id.is_none() && instance.deploy_rev != deploy_rev {
                    doomed.push(key.value().to_string());
                }
            }
            for key in &doomed {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            count = doomed.len() as u32;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%service_id, count, "purged unstarted instances");
        Ok(count)
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or update a host node.
    pub fn put_node(&self, node: &HostNode) -> StateResult<()> {
        self.put_value(NODES, &node.table_key(), node)
    }

    /// Register a node with a grid if it is not known yet.
    ///
    /// Returns the stored node and whether it was newly created.
    pub fn register_node(&self, grid: &str, node_id: &str, name: &str) -> StateResult<(HostNode, bool)> {
        let key = format!("{grid}/{node_id}");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let result;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            let existing = table
                .get(key.as_str())
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec());
            result = match existing {
                Some(bytes) => {
                    let node: HostNode = serde_json::from_slice(&bytes)?;
                    (node, false)
                }
                None => {
                    let node = HostNode {
                        id: node_id.to_string(),
                        name: name.to_string(),
                        grid: grid.to_string(),
                        labels: Default::default(),
                        capacity_memory_bytes: 0,
                        used_memory_bytes: 0,
                        connected: true,
                        last_seen: epoch_secs(),
                    };
                    let value = serde_json::to_vec(&node)?;
                    table
                        .insert(key.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    (node, true)
                }
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, created = result.1, "node registered");
        Ok(result)
    }

    /// List all nodes of a grid.
    pub fn list_nodes(&self, grid: &str) -> StateResult<Vec<HostNode>> {
        self.scan_prefix(NODES, &format!("{grid}/"))
    }

    // ── Registries ─────────────────────────────────────────────────

    /// Insert or update grid-scoped registry credentials.
    pub fn put_registry(&self, creds: &RegistryCredentials) -> StateResult<()> {
        self.put_value(REGISTRIES, &creds.table_key(), creds)
    }

    /// Look up credentials for a registry name within a grid.
    pub fn find_registry(&self, grid: &str, name: &str) -> StateResult<Option<RegistryCredentials>> {
        self.get_value(REGISTRIES, &format!("{grid}/{name}"))
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn put_value<T: Serialize>(&self, def: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let value = serde_json::to_vec(value)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_value<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value())?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn scan_prefix<T: DeserializeOwned>(&self, def: JsonTable, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let item = serde_json::from_slice(value.value())?;
                results.push(item);
            }
        }
        Ok(results)
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_service(grid: &str, name: &str) -> Service {
        Service {
            id: service_key(grid, name),
            grid: grid.to_string(),
            name: name.to_string(),
            image: "nginx:latest".to_string(),
            container_count: 2,
            deploy_opts: DeployOpts::default(),
            strategy: PlacementKind::Spread,
            instance_policy: InstancePolicy::Fixed,
            constraints: HashMap::new(),
            affinity: HashMap::new(),
            memory_bytes: 64 * 1024 * 1024,
            state: ServiceState::Running,
            deployed_at: None,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn test_instance(service_id: &str, n: u32, rev: &str) -> Instance {
        Instance {
            id: format!("{n}-{rev}"),
            service_id: service_id.to_string(),
            instance_number: n,
            name: format!("web-{n}"),
            deploy_rev: rev.to_string(),
            host_node: "node-1".to_string(),
            container_id: Some(format!("c{n}")),
            deleted_at: None,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn test_node(grid: &str, id: &str) -> HostNode {
        HostNode {
            id: id.to_string(),
            name: id.to_string(),
            grid: grid.to_string(),
            labels: HashMap::new(),
            capacity_memory_bytes: 8 * 1024 * 1024 * 1024,
            used_memory_bytes: 0,
            connected: true,
            last_seen: 1000,
        }
    }

    // ── Services ───────────────────────────────────────────────────

    #[test]
    fn service_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let svc = test_service("prod", "web");

        store.put_service(&svc).unwrap();
        let retrieved = store.get_service("prod/web").unwrap();

        assert_eq!(retrieved, Some(svc));
    }

    #[test]
    fn services_are_grid_scoped() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_service(&test_service("prod", "a")).unwrap();
        store.put_service(&test_service("staging", "a")).unwrap();

        assert_eq!(store.get_service("prod/a").unwrap().unwrap().grid, "prod");
        assert_eq!(store.get_service("staging/a").unwrap().unwrap().grid, "staging");
    }

    #[test]
    fn put_service_rejects_id_not_matching_key() {
        let store = StateStore::open_in_memory().unwrap();
        let mut svc = test_service("prod", "web");
        svc.id = "web".to_string();

        let result = store.put_service(&svc);
        assert!(matches!(result, Err(StateError::KeyMismatch { .. })));
        assert!(store.get_service("prod/web").unwrap().is_none());
        assert_eq!(store.service_state("web").unwrap(), None);
    }

    #[test]
    fn begin_deploy_is_exclusive() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_service(&test_service("prod", "web")).unwrap();

        assert!(store.begin_deploy("prod/web", 2000).unwrap());
        assert!(!store.begin_deploy("prod/web", 3000).unwrap());

        let svc = store.get_service("prod/web").unwrap().unwrap();
        assert_eq!(svc.state, ServiceState::Deploying);
        assert_eq!(svc.deployed_at, Some(2000));
    }

    #[test]
    fn begin_deploy_unknown_service_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let result = store.begin_deploy("prod/missing", 1);
        assert!(matches!(result, Err(StateError::NotFound(_))));
    }

    #[test]
    fn set_state_releases_deploy_lock() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_service(&test_service("prod", "web")).unwrap();
        store.begin_deploy("prod/web", 2000).unwrap();

        store.set_service_state("prod/web", ServiceState::Running).unwrap();
        assert_eq!(
            store.service_state("prod/web").unwrap(),
            Some(ServiceState::Running)
        );
        assert!(store.begin_deploy("prod/web", 3000).unwrap());
    }

    // ── Instances ──────────────────────────────────────────────────

    #[test]
    fn stale_instances_exclude_current_rev_and_deleted() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_instance(&test_instance("prod/web", 1, "r1")).unwrap();
        store.put_instance(&test_instance("prod/web", 2, "r1")).unwrap();
        store.put_instance(&test_instance("prod/web", 1, "r2")).unwrap();
        let mut gone = test_instance("prod/web", 3, "r1");
        gone.deleted_at = Some(1500);
        store.put_instance(&gone).unwrap();

        let stale = store.list_stale_instances("prod/web", "r2").unwrap();
        assert_eq!(stale.len(), 2);
        assert!(stale.iter().all(|i| i.deploy_rev == "r1" && i.is_live()));
    }

    #[test]
    fn find_instance_matches_ordinal_and_rev() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_instance(&test_instance("prod/web", 1, "r1")).unwrap();
        store.put_instance(&test_instance("prod/web", 1, "r2")).unwrap();

        let found = store.find_instance("prod/web", 1, "r2").unwrap().unwrap();
        assert_eq!(found.deploy_rev, "r2");
        assert!(store.find_instance("prod/web", 2, "r2").unwrap().is_none());
    }

    #[test]
    fn soft_delete_keeps_first_marker() {
        let store = StateStore::open_in_memory().unwrap();
        let inst = test_instance("prod/web", 1, "r1");
        store.put_instance(&inst).unwrap();

        assert!(store.soft_delete_instance(&inst.table_key(), 2000).unwrap());
        assert!(!store.soft_delete_instance(&inst.table_key(), 3000).unwrap());

        let stored = store.get_instance(&inst.table_key()).unwrap().unwrap();
        assert_eq!(stored.deleted_at, Some(2000));
        assert!(store.list_live_instances("prod/web").unwrap().is_empty());
    }

    #[test]
    fn purge_only_erases_unstarted_stale_records() {
        let store = StateStore::open_in_memory().unwrap();
        let mut unstarted_old = test_instance("prod/web", 1, "r1");
        unstarted_old.container_id = None;
        let mut unstarted_deleted = test_instance("prod/web", 2, "r1");
        unstarted_deleted.container_id = None;
        unstarted_deleted.deleted_at = Some(1500);
        let started_old = test_instance("prod/web", 3, "r1");
        let mut unstarted_current = test_instance("prod/web", 1, "r2");
        unstarted_current.container_id = None;
        let mut other_service = test_instance("prod/db", 1, "r1");
        other_service.container_id = None;

        for i in [
            &unstarted_old,
            &unstarted_deleted,
            &started_old,
            &unstarted_current,
            &other_service,
        ] {
            store.put_instance(i).unwrap();
        }

        assert_eq!(store.purge_unstarted_instances("prod/web", "r2").unwrap(), 2);
        let remaining = store.list_instances_for_service("prod/web").unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(store.list_instances_for_service("prod/db").unwrap().len(), 1);
    }

    // ── Nodes ──────────────────────────────────────────────────────

    #[test]
    fn register_node_creates_once() {
        let store = StateStore::open_in_memory().unwrap();

        let (node, created) = store.register_node("prod", "abc", "node-1").unwrap();
        assert!(created);
        assert_eq!(node.name, "node-1");

        let (node, created) = store.register_node("prod", "abc", "renamed").unwrap();
        assert!(!created);
        assert_eq!(node.name, "node-1");
        assert_eq!(store.list_nodes("prod").unwrap().len(), 1);
    }

    #[test]
    fn nodes_are_grid_scoped() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_node(&test_node("prod", "n1")).unwrap();
        store.put_node(&test_node("prod", "n2")).unwrap();
        store.put_node(&test_node("dev", "n1")).unwrap();

        assert_eq!(store.list_nodes("prod").unwrap().len(), 2);
        assert_eq!(store.list_nodes("dev").unwrap().len(), 1);
    }

    // ── Registries ─────────────────────────────────────────────────

    #[test]
    fn registry_lookup_by_grid_and_name() {
        let store = StateStore::open_in_memory().unwrap();
        let creds = RegistryCredentials {
            grid: "prod".to_string(),
            name: "registry.example.com".to_string(),
            url: "https://registry.example.com".to_string(),
            username: "deploy".to_string(),
            password: "secret".to_string(),
            email: None,
        };
        store.put_registry(&creds).unwrap();

        assert_eq!(
            store.find_registry("prod", "registry.example.com").unwrap(),
            Some(creds)
        );
        assert!(store.find_registry("dev", "registry.example.com").unwrap().is_none());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_service(&test_service("prod", "api")).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let svc = store.get_service("prod/api").unwrap();
        assert_eq!(svc.unwrap().name, "api");
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.get_service("any/web").unwrap().is_none());
        assert!(store.list_nodes("any").unwrap().is_empty());
        assert!(store.list_instances_for_service("any").unwrap().is_empty());
        assert!(store.get_instance("nope").unwrap().is_none());
        assert_eq!(store.purge_unstarted_instances("any", "r1").unwrap(), 0);
    }
}
