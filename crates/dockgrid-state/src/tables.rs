//! redb table definitions for the dockgrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).
//! Composite keys follow the pattern `{grid}/{name}` or `{parent_id}:{child_id}`.

use redb::TableDefinition;

/// Services keyed by `{grid}/{name}`.
pub const SERVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("services");

/// Instances keyed by `{service_id}:{instance_id}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Host nodes keyed by `{grid}/{node_id}`.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Registry credentials keyed by `{grid}/{registry_name}`.
pub const REGISTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("registries");

/// Shape shared by every table: string keys, JSON byte values.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;
