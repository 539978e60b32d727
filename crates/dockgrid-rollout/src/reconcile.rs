//! Post-rollout reconciliation of stale instances.
//!
//! Runs only after every instance of the new revision deployed. Each live
//! instance still carrying an older `deploy_rev` is soft-deleted first, so
//! it leaves the live view whatever happens to its teardown. Then, if it
//! ever started, it is terminated on its node unless its ordinal is within
//! the new instance count and the new revision placed that ordinal on the
//! same node. Teardowns run concurrently, at most one per candidate node.
//!
//! Records of stale revisions that never got an execution identity are
//! then erased. Teardown errors are logged and counted, never fatal.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use dockgrid_state::store::epoch_secs;
use dockgrid_state::{HostNode, Service};

use crate::deployer::Deployer;
use crate::error::{DeployResult, ExecutionError};

/// Result of one teardown task: ordinal, node id, outcome.
type TeardownReport = (u32, String, Result<(), ExecutionError>);

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Live instances found with an older revision.
    pub stale: u32,
    /// Teardown skipped because the new revision placed the ordinal on the
    /// same node.
    pub preserved: u32,
    /// Teardown skipped because the replacement lookup failed.
    pub skipped: u32,
    pub soft_deleted: u32,
    pub terminated: u32,
    pub teardown_failures: u32,
    /// Never-started records erased.
    pub purged: u32,
}

impl Deployer {
    pub(crate) async fn reconcile(
        &self,
        service: &Arc<Service>,
        nodes: &[HostNode],
        total_instances: u32,
        deploy_rev: &str,
    ) -> DeployResult<CleanupReport> {
        let stale = self.state.list_stale_instances(&service.id, deploy_rev)?;
        let bound = nodes.len().max(1);
        let mut report = CleanupReport {
            stale: stale.len() as u32,
            ..Default::default()
        };
        let mut teardowns: JoinSet<TeardownReport> = JoinSet::new();

        for instance in stale {
            let instance_number = instance.instance_number;

            if self
                .state
                .soft_delete_instance(&instance.table_key(), epoch_secs())?
            {
                report.soft_deleted += 1;
            }

            // Never started: nothing to stop, the record is purged below.
            if instance.container_id.is_none() {
                continue;
            }

            if instance_number <= total_instances {
                match self
                    .executor
                    .find_instance(service, instance_number, deploy_rev)
                    .await
                {
                    Ok(Some(current)) if current.host_node == instance.host_node => {
                        debug!(
                            service = %service.id,
                            instance = %instance.name,
                            node = %instance.host_node,
                            "placement unchanged, skipping teardown"
                        );
                        report.preserved += 1;
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            service = %service.id,
                            instance = %instance.name,
                            error = %e,
                            "cannot confirm replacement, skipping teardown"
                        );
                        report.skipped += 1;
                        continue;
                    }
                }
            }

            while teardowns.len() >= bound {
                let Some(joined) = teardowns.join_next().await else {
                    break;
                };
                record_teardown(&service.id, joined, &mut report);
            }

            info!(
                service = %service.id,
                instance = %instance.name,
                node = %instance.host_node,
                "removing service instance"
            );
            let executor = Arc::clone(&self.executor);
            let owner = Arc::clone(service);
            let node_id = instance.host_node.clone();
            teardowns.spawn(async move {
                let outcome = executor
                    .terminate_instance(&owner, instance_number, &node_id)
                    .await;
                (instance_number, node_id, outcome)
            });
        }

        while let Some(joined) = teardowns.join_next().await {
            record_teardown(&service.id, joined, &mut report);
        }

        report.purged = self
            .state
            .purge_unstarted_instances(&service.id, deploy_rev)?;

        info!(
            service = %service.id,
            stale = report.stale,
            preserved = report.preserved,
            terminated = report.terminated,
            teardown_failures = report.teardown_failures,
            purged = report.purged,
            "stale instances reconciled"
        );
        Ok(report)
    }
}

fn record_teardown(
    service_id: &str,
    joined: Result<TeardownReport, JoinError>,
    report: &mut CleanupReport,
) {
    match joined {
        Ok((_, _, Ok(()))) => report.terminated += 1,
        Ok((instance_number, node_id, Err(e))) => {
            report.teardown_failures += 1;
            error!(
                service = %service_id,
                instance = instance_number,
                node = %node_id,
                error = %e,
                "failed to remove service instance"
            );
        }
        Err(e) => {
            report.teardown_failures += 1;
            error!(service = %service_id, error = %e, "teardown task did not complete");
        }
    }
}
