//! Shared fixtures for deployer integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dockgrid_rollout::*;
use dockgrid_scheduler::Scheduler;
use dockgrid_state::*;

pub const OLD_REV: &str = "00000000000000000001";

pub fn test_store() -> StateStore {
    StateStore::open_in_memory().unwrap()
}

pub fn test_service(container_count: u32, min_health: Option<f64>) -> Service {
    Service {
        id: "prod/web".to_string(),
        grid: "prod".to_string(),
        name: "web".to_string(),
        image: "nginx:latest".to_string(),
        container_count,
        deploy_opts: DeployOpts { min_health },
        strategy: PlacementKind::Spread,
        instance_policy: InstancePolicy::Fixed,
        constraints: HashMap::new(),
        affinity: HashMap::new(),
        memory_bytes: 128,
        state: ServiceState::Running,
        deployed_at: None,
        created_at: 1000,
        updated_at: 1000,
    }
}

pub fn test_nodes(count: usize, capacity: u64) -> Vec<HostNode> {
    (1..=count)
        .map(|i| HostNode {
            id: format!("n{i}"),
            name: format!("node-{i}"),
            grid: "prod".to_string(),
            labels: HashMap::new(),
            capacity_memory_bytes: capacity,
            used_memory_bytes: 0,
            connected: true,
            last_seen: 1000,
        })
        .collect()
}

/// Store an instance left behind by an earlier revision.
pub fn seed_stale(
    store: &StateStore,
    service: &Service,
    instance_number: u32,
    node_id: &str,
    started: bool,
) -> Instance {
    let instance = Instance {
        id: format!("{instance_number}-{OLD_REV}"),
        service_id: service.id.clone(),
        instance_number,
        name: service.instance_name(instance_number),
        deploy_rev: OLD_REV.to_string(),
        host_node: node_id.to_string(),
        container_id: started.then(|| format!("old-{instance_number}")),
        deleted_at: None,
        created_at: 500,
        updated_at: 500,
    };
    store.put_instance(&instance).unwrap();
    instance
}

pub fn test_deployer(store: &StateStore, service: &Service, executor: Arc<FakeExecutor>) -> Deployer {
    let config = DeployerConfig {
        dispatch_interval_ms: 0,
        ..Default::default()
    };
    Deployer::new(Scheduler::for_service(service), store.clone(), executor, config)
}

/// A side effect fired when a given ordinal starts deploying.
pub type Hook = Box<dyn Fn() + Send + Sync>;

/// In-process executor that records instances straight into the store.
pub struct FakeExecutor {
    store: StateStore,
    delay: Duration,
    unhealthy: HashSet<u32>,
    erroring: HashSet<u32>,
    failing_teardown: bool,
    failing_lookup: bool,
    hook: Option<(u32, Hook)>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    teardowns_in_flight: AtomicUsize,
    teardown_peak: AtomicUsize,
    deployed: Mutex<Vec<(u32, String, String)>>,
    terminated: Mutex<Vec<(u32, String)>>,
    creds_seen: Mutex<Vec<Option<String>>>,
}

impl FakeExecutor {
    pub fn new(store: &StateStore) -> Self {
        Self {
            store: store.clone(),
            delay: Duration::from_millis(10),
            unhealthy: HashSet::new(),
            erroring: HashSet::new(),
            failing_teardown: false,
            failing_lookup: false,
            hook: None,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            teardowns_in_flight: AtomicUsize::new(0),
            teardown_peak: AtomicUsize::new(0),
            deployed: Mutex::new(Vec::new()),
            terminated: Mutex::new(Vec::new()),
            creds_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Report ordinal `n` as unhealthy.
    pub fn unhealthy_on(mut self, n: u32) -> Self {
        self.unhealthy.insert(n);
        self
    }

    /// Fail ordinal `n` with an RPC error.
    pub fn error_on(mut self, n: u32) -> Self {
        self.erroring.insert(n);
        self
    }

    pub fn failing_teardown(mut self) -> Self {
        self.failing_teardown = true;
        self
    }

    pub fn failing_lookup(mut self) -> Self {
        self.failing_lookup = true;
        self
    }

    pub fn hook_on(mut self, n: u32, hook: Hook) -> Self {
        self.hook = Some((n, hook));
        self
    }

    pub fn dispatched(&self) -> Vec<u32> {
        let mut ordinals: Vec<u32> = self.deployed.lock().unwrap().iter().map(|d| d.0).collect();
        ordinals.sort_unstable();
        ordinals
    }

    /// `(ordinal, node id)` of every deployed instance, sorted by ordinal.
    pub fn placements(&self) -> Vec<(u32, String)> {
        let mut placed: Vec<_> = self
            .deployed
            .lock()
            .unwrap()
            .iter()
            .map(|(n, node, _)| (*n, node.clone()))
            .collect();
        placed.sort();
        placed
    }

    /// Revision stamped on the deployed instances.
    pub fn deploy_rev(&self) -> Option<String> {
        self.deployed.lock().unwrap().first().map(|d| d.2.clone())
    }

    pub fn terminated(&self) -> Vec<(u32, String)> {
        let mut done = self.terminated.lock().unwrap().clone();
        done.sort();
        done
    }

    pub fn creds_seen(&self) -> Vec<Option<String>> {
        self.creds_seen.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn peak_teardowns(&self) -> usize {
        self.teardown_peak.load(Ordering::SeqCst)
    }
}

fn enter(current: &AtomicUsize, peak: &AtomicUsize) {
    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
    peak.fetch_max(now, Ordering::SeqCst);
}

#[async_trait]
impl InstanceExecutor for FakeExecutor {
    async fn deploy_instance(
        &self,
        service: &Service,
        node: &HostNode,
        instance_number: u32,
        deploy_rev: &str,
        creds: Option<&RegistryCredentials>,
    ) -> Result<bool, ExecutionError> {
        enter(&self.in_flight, &self.peak);
        self.deployed.lock().unwrap().push((
            instance_number,
            node.id.clone(),
            deploy_rev.to_string(),
        ));
        self.creds_seen
            .lock()
            .unwrap()
            .push(creds.map(|c| c.name.clone()));
        if let Some((n, hook)) = &self.hook {
            if *n == instance_number {
                hook();
            }
        }

        tokio::time::sleep(self.delay).await;

        let result = if self.erroring.contains(&instance_number) {
            Err(ExecutionError::Rpc {
                node: node.id.clone(),
                message: "agent unreachable".to_string(),
            })
        } else {
            self.store
                .put_instance(&Instance {
                    id: format!("{instance_number}-{deploy_rev}"),
                    service_id: service.id.clone(),
                    instance_number,
                    name: service.instance_name(instance_number),
                    deploy_rev: deploy_rev.to_string(),
                    host_node: node.id.clone(),
                    container_id: Some(format!("c-{instance_number}")),
                    deleted_at: None,
                    created_at: 2000,
                    updated_at: 2000,
                })
                .map_err(|e| ExecutionError::Other(e.to_string()))?;
            Ok(!self.unhealthy.contains(&instance_number))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn find_instance(
        &self,
        service: &Service,
        instance_number: u32,
        deploy_rev: &str,
    ) -> Result<Option<Instance>, ExecutionError> {
        if self.failing_lookup {
            return Err(ExecutionError::Timeout {
                node: "master".to_string(),
                operation: "find_instance".to_string(),
            });
        }
        self.store
            .find_instance(&service.id, instance_number, deploy_rev)
            .map_err(|e| ExecutionError::Other(e.to_string()))
    }

    async fn terminate_instance(
        &self,
        _service: &Service,
        instance_number: u32,
        node_id: &str,
    ) -> Result<(), ExecutionError> {
        enter(&self.teardowns_in_flight, &self.teardown_peak);
        tokio::time::sleep(self.delay).await;
        self.teardowns_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_teardown {
            return Err(ExecutionError::Rpc {
                node: node_id.to_string(),
                message: "container not found".to_string(),
            });
        }
        self.terminated
            .lock()
            .unwrap()
            .push((instance_number, node_id.to_string()));
        Ok(())
    }
}
