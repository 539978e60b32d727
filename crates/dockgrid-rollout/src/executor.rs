//! The single-instance executor seam.
//!
//! Starting or stopping one container on one node's agent lives outside
//! the deployer. The deployer only decides what must happen, in what order
//! and how many at a time, then calls through this trait.

use async_trait::async_trait;

use dockgrid_state::{HostNode, Instance, RegistryCredentials, Service};

use crate::error::ExecutionError;

/// Starts, finds and terminates individual service instances.
///
/// Implementations must be safe to call concurrently for different
/// ordinals of the same service. A successful `deploy_instance` is
/// expected to leave an instance record stamped with `deploy_rev`.
#[async_trait]
pub trait InstanceExecutor: Send + Sync {
    /// Deploy ordinal `instance_number` of `service` onto `node`.
    ///
    /// `Ok(false)` means the instance came up unhealthy.
    async fn deploy_instance(
        &self,
        service: &Service,
        node: &HostNode,
        instance_number: u32,
        deploy_rev: &str,
        creds: Option<&RegistryCredentials>,
    ) -> Result<bool, ExecutionError>;

    /// The live instance for an ordinal under `deploy_rev`, if any.
    async fn find_instance(
        &self,
        service: &Service,
        instance_number: u32,
        deploy_rev: &str,
    ) -> Result<Option<Instance>, ExecutionError>;

    /// Stop and remove ordinal `instance_number` on node `node_id`.
    async fn terminate_instance(
        &self,
        service: &Service,
        instance_number: u32,
        node_id: &str,
    ) -> Result<(), ExecutionError>;
}
