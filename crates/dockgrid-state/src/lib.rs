//! dockgrid-state: embedded state store for dockgrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! state for services, their instances, grid nodes, and registry credentials.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{grid}/{name}`, `{service_id}:{instance_id}`) enable
//! prefix scans for related records.
//!
//! Every mutating operation runs in its own write transaction, so state
//! transitions such as [`StateStore::begin_deploy`] and
//! [`StateStore::soft_delete_instance`] are atomic and safe to call from
//! concurrent tasks. The `StateStore` is `Clone` + `Send` + `Sync`.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult, StorageOp};
pub use store::StateStore;
pub use types::*;
