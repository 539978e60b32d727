//! Dry-run executor.
//!
//! Stands in for the node agents: a deployed instance is only recorded in
//! the state store, and a terminated one is only logged. Lets `dockd
//! deploy` exercise a full rollout, including reconciliation, against a
//! local store.
//!
//! Records are keyed by ordinal and node, so redeploying an ordinal onto
//! the node it already runs on replaces the record in place, the way an
//! agent recreates a container under the same name.

use async_trait::async_trait;
use tracing::info;

use dockgrid_rollout::{ExecutionError, InstanceExecutor};
use dockgrid_state::store::epoch_secs;
use dockgrid_state::{HostNode, Instance, RegistryCredentials, Service, StateStore};

pub struct DryRunExecutor {
    state: StateStore,
}

impl DryRunExecutor {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }
}

fn store_err(e: dockgrid_state::StateError) -> ExecutionError {
    ExecutionError::Other(e.to_string())
}

#[async_trait]
impl InstanceExecutor for DryRunExecutor {
    async fn deploy_instance(
        &self,
        service: &Service,
        node: &HostNode,
        instance_number: u32,
        deploy_rev: &str,
        creds: Option<&RegistryCredentials>,
    ) -> Result<bool, ExecutionError> {
        let now = epoch_secs();
        let name = service.instance_name(instance_number);
        let instance = Instance {
            id: format!("{instance_number}@{}", node.id),
            service_id: service.id.clone(),
            instance_number,
            container_id: Some(format!("dry-run-{name}-{deploy_rev}")),
            name,
            deploy_rev: deploy_rev.to_string(),
            host_node: node.id.clone(),
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        self.state.put_instance(&instance).map_err(store_err)?;

        info!(
            instance = %instance.name,
            node = %node.name,
            image = %service.image,
            registry = ?creds.map(|c| c.name.as_str()),
            "dry run: instance recorded"
        );
        Ok(true)
    }

    async fn find_instance(
        &self,
        service: &Service,
        instance_number: u32,
        deploy_rev: &str,
    ) -> Result<Option<Instance>, ExecutionError> {
        self.state
            .find_instance(&service.id, instance_number, deploy_rev)
            .map_err(store_err)
    }

    async fn terminate_instance(
        &self,
        service: &Service,
        instance_number: u32,
        node_id: &str,
    ) -> Result<(), ExecutionError> {
        info!(
            instance = %service.instance_name(instance_number),
            node = %node_id,
            "dry run: instance would be terminated"
        );
        Ok(())
    }
}
