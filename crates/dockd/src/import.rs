//! Seed manifest import.
//!
//! A manifest is a JSON document describing a grid's nodes, services and
//! registry credentials:
//!
//! ```json
//! {
//!   "nodes": [{ "id": "n1", "name": "node-1", "grid": "prod" }],
//!   "services": [{ "grid": "prod", "name": "web", "image": "nginx", "container_count": 3 }],
//!   "registries": []
//! }
//! ```
//!
//! Importing is an upsert. A service that already exists keeps its
//! lifecycle state and creation time.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use dockgrid_state::store::epoch_secs;
use dockgrid_state::{
    DeployOpts, HostNode, InstancePolicy, PlacementKind, RegistryCredentials, Service,
    ServiceState, StateStore, service_key,
};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedManifest {
    pub nodes: Vec<HostNode>,
    pub services: Vec<ServiceSeed>,
    pub registries: Vec<RegistryCredentials>,
}

/// Declared shape of a service; the id and timestamps are derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSeed {
    pub grid: String,
    pub name: String,
    pub image: String,
    #[serde(default = "default_count")]
    pub container_count: u32,
    #[serde(default)]
    pub deploy_opts: DeployOpts,
    #[serde(default)]
    pub strategy: PlacementKind,
    #[serde(default)]
    pub instance_policy: InstancePolicy,
    #[serde(default)]
    pub constraints: HashMap<String, String>,
    #[serde(default)]
    pub affinity: HashMap<String, String>,
    #[serde(default)]
    pub memory_bytes: u64,
}

fn default_count() -> u32 {
    1
}

/// What an import wrote.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub nodes: usize,
    pub services: usize,
    pub registries: usize,
}

impl SeedManifest {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl ServiceSeed {
    fn into_service(self, existing: Option<Service>, now: u64) -> Service {
        let (state, created_at, deployed_at) = match existing {
            Some(s) => (s.state, s.created_at, s.deployed_at),
            None => (ServiceState::Initialized, now, None),
        };
        Service {
            id: service_key(&self.grid, &self.name),
            grid: self.grid,
            name: self.name,
            image: self.image,
            container_count: self.container_count,
            deploy_opts: self.deploy_opts,
            strategy: self.strategy,
            instance_policy: self.instance_policy,
            constraints: self.constraints,
            affinity: self.affinity,
            memory_bytes: self.memory_bytes,
            state,
            deployed_at,
            created_at,
            updated_at: now,
        }
    }
}

/// Write every record of `manifest` into `state`.
pub fn import(state: &StateStore, manifest: SeedManifest) -> anyhow::Result<ImportSummary> {
    let now = epoch_secs();
    let mut summary = ImportSummary::default();

    for node in &manifest.nodes {
        state.put_node(node)?;
        debug!(grid = %node.grid, node = %node.name, "node imported");
        summary.nodes += 1;
    }

    for seed in manifest.services {
        let key = service_key(&seed.grid, &seed.name);
        let existing = state.get_service(&key)?;
        let service = seed.into_service(existing, now);
        state.put_service(&service)?;
        debug!(service = %service.id, image = %service.image, "service imported");
        summary.services += 1;
    }

    for creds in &manifest.registries {
        state.put_registry(creds)?;
        debug!(grid = %creds.grid, registry = %creds.name, "registry credentials imported");
        summary.registries += 1;
    }

    info!(
        nodes = summary.nodes,
        services = summary.services,
        registries = summary.registries,
        "seed manifest imported"
    );
    Ok(summary)
}
