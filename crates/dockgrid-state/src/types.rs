//! Domain types for the dockgrid state store.
//!
//! These types represent the persisted state of services, their instances,
//! grid host nodes, and registry credentials. All types are serializable
//! to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable path of a service: `{grid}/{name}`.
pub type ServiceId = String;

/// Unique identifier for an instance record within a service.
pub type InstanceId = String;

/// Unique identifier for a node within a grid.
pub type NodeId = String;

/// Default fraction of instances that must stay available during a rollout.
pub const DEFAULT_MIN_HEALTH: f64 = 0.8;

// ── Service ────────────────────────────────────────────────────────

/// A deployable service and its desired shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: ServiceId,
    /// Owning grid.
    pub grid: String,
    pub name: String,
    /// Image reference (`registry/repo:tag` or a bare name).
    pub image: String,
    /// Declared instance count.
    pub container_count: u32,
    #[serde(default)]
    pub deploy_opts: DeployOpts,
    #[serde(default)]
    pub strategy: PlacementKind,
    #[serde(default)]
    pub instance_policy: InstancePolicy,
    /// Node labels that must all be present for a node to be eligible.
    #[serde(default)]
    pub constraints: HashMap<String, String>,
    /// Node labels that make a node preferred (soft affinity).
    #[serde(default)]
    pub affinity: HashMap<String, String>,
    /// Memory reserved per instance, in bytes.
    #[serde(default)]
    pub memory_bytes: u64,
    pub state: ServiceState,
    /// Unix timestamp of the last deploy attempt.
    #[serde(default)]
    pub deployed_at: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Rollout options declared on a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DeployOpts {
    /// Fraction of instances (0.0–1.0) that must remain healthy during rollout.
    pub min_health: Option<f64>,
}

impl DeployOpts {
    /// `min_health` clamped into `[0, 1]`, falling back to `default`.
    pub fn effective_min_health(&self, default: f64) -> f64 {
        match self.min_health {
            Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
            _ => default.clamp(0.0, 1.0),
        }
    }
}

/// Lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Initialized,
    Running,
    Deploying,
    Stopped,
}

/// Which placement policy selects nodes for a service's instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlacementKind {
    /// Rotate ordinals across eligible nodes.
    #[default]
    Spread,
    /// Bin-pack instances onto the fullest node that still fits.
    Packed,
    /// Prefer nodes matching the service's affinity labels.
    Affinity,
}

/// How the total instance count is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstancePolicy {
    /// Run exactly `container_count` instances.
    #[default]
    Fixed,
    /// Run one instance per candidate node.
    PerNode,
}

impl Service {
    /// Build the composite key for the services table.
    pub fn table_key(&self) -> String {
        service_key(&self.grid, &self.name)
    }

    /// Deterministic instance name for an ordinal: `{grid}/{name}-{n}`.
    pub fn instance_name(&self, instance_number: u32) -> String {
        format!("{}-{}", self.id, instance_number)
    }

    pub fn is_deploying(&self) -> bool {
        self.state == ServiceState::Deploying
    }
}

/// Composite key for a service.
pub fn service_key(grid: &str, name: &str) -> String {
    format!("{grid}/{name}")
}

// ── Host node ─────────────────────────────────────────────────────

/// A candidate execution target in a grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostNode {
    pub id: NodeId,
    pub name: String,
    pub grid: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Total memory available on this node (bytes). Zero means unknown.
    #[serde(default)]
    pub capacity_memory_bytes: u64,
    #[serde(default)]
    pub used_memory_bytes: u64,
    #[serde(default = "default_connected")]
    pub connected: bool,
    /// Unix timestamp of the last agent contact.
    #[serde(default)]
    pub last_seen: u64,
}

fn default_connected() -> bool {
    true
}

impl HostNode {
    /// Build the composite key for the nodes table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.grid, self.id)
    }
}

// ── Instance ──────────────────────────────────────────────────────

/// One running (or terminating) unit of a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub id: InstanceId,
    pub service_id: ServiceId,
    /// 1-based ordinal.
    pub instance_number: u32,
    /// `{service-name}-{instance_number}`.
    pub name: String,
    /// Revision of the rollout that created or confirmed this instance.
    pub deploy_rev: String,
    /// Node the instance runs on.
    pub host_node: NodeId,
    /// Execution identity assigned by the node agent once started.
    #[serde(default)]
    pub container_id: Option<String>,
    /// Soft-delete marker.
    #[serde(default)]
    pub deleted_at: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Instance {
    /// Build the composite key for the instances table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.service_id, self.id)
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

// ── Registry credentials ──────────────────────────────────────────

/// Grid-scoped credentials for pulling from an image registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryCredentials {
    pub grid: String,
    /// Registry host name, e.g. `registry.example.com` or `index.docker.io`.
    pub name: String,
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl RegistryCredentials {
    /// Build the composite key for the registries table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.grid, self.name)
    }
}
