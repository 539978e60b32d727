//! Deployer: drives the rollout of a new service revision.
//!
//! A deploy moves the service `running → deploying → running`:
//!
//! 1. resolve registry credentials for the image
//! 2. claim the service by flipping it to `deploying` (one rollout at a time)
//! 3. for each ordinal `1..=total`, re-check the claim and cancellation,
//!    pick a node and dispatch the instance as an independent task
//! 4. throttle so that no more than `floor(total * (1 - min_health))`
//!    instances are in flight (at least 1, at most `max_in_flight`)
//! 5. drain every dispatched task, then reconcile stale revisions
//!
//! Any fatal condition stops new dispatches. Tasks already dispatched are
//! still awaited, and the service is always put back to `running`.

use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dockgrid_scheduler::Scheduler;
use dockgrid_state::store::epoch_secs;
use dockgrid_state::{HostNode, RegistryCredentials, Service, ServiceState, StateStore};

use crate::config::DeployerConfig;
use crate::error::{DeployError, DeployResult, ExecutionError};
use crate::executor::InstanceExecutor;
use crate::reconcile::CleanupReport;
use crate::registry::creds_for_registry;
use crate::revision::next_deploy_rev;

/// Result of one dispatched instance deploy.
type UnitReport = (u32, Result<bool, ExecutionError>);

/// How a deploy attempt ended.
#[derive(Debug)]
pub enum DeployOutcome {
    /// Every instance rolled out and stale revisions were reconciled.
    Deployed(CleanupReport),
    /// Another rollout of the same service was already in flight.
    AlreadyDeploying,
    /// The deploy was aborted; the service is back in `running`.
    Failed(DeployError),
}

impl DeployOutcome {
    pub fn is_deployed(&self) -> bool {
        matches!(self, Self::Deployed(_))
    }
}

/// Orchestrates deploys of one service's revisions.
pub struct Deployer {
    pub(crate) scheduler: Scheduler,
    pub(crate) state: StateStore,
    pub(crate) executor: Arc<dyn InstanceExecutor>,
    pub(crate) config: DeployerConfig,
}

impl Deployer {
    pub fn new(
        scheduler: Scheduler,
        state: StateStore,
        executor: Arc<dyn InstanceExecutor>,
        config: DeployerConfig,
    ) -> Self {
        Self {
            scheduler,
            state,
            executor,
            config,
        }
    }

    /// Total number of instances a deploy over `nodes` would run.
    pub fn total_instance_count(&self, service: &Service, nodes: &[HostNode]) -> u32 {
        self.scheduler.total_instances(service, nodes)
    }

    /// Feasibility probe: can every ordinal be placed? No side effects.
    pub fn can_deploy_all(&self, service: &Service, nodes: &[HostNode]) -> bool {
        self.scheduler.can_deploy_all(service, nodes)
    }

    /// Placement preview in ordinal order. No side effects.
    pub fn selected_nodes<'a>(&self, service: &Service, nodes: &'a [HostNode]) -> Vec<&'a HostNode> {
        self.scheduler.selected_nodes(service, nodes)
    }

    /// Deploy `service` over `nodes`.
    ///
    /// Returns true iff the rollout fully succeeded and reconciliation ran.
    /// Never panics or returns an error; failures are logged.
    pub async fn deploy(
        &self,
        service: &Service,
        nodes: &[HostNode],
        cancel: &CancellationToken,
    ) -> bool {
        self.deploy_report(service, nodes, cancel).await.is_deployed()
    }

    /// Like [`deploy`](Self::deploy), but reports how the attempt ended.
    pub async fn deploy_report(
        &self,
        service: &Service,
        nodes: &[HostNode],
        cancel: &CancellationToken,
    ) -> DeployOutcome {
        info!(service = %service.id, image = %service.image, "starting to deploy");

        let creds = match creds_for_registry(&self.state, service) {
            Ok(creds) => creds,
            Err(e) => {
                error!(service = %service.id, error = %e, "cannot resolve registry credentials");
                return DeployOutcome::Failed(e.into());
            }
        };

        match self.state.begin_deploy(&service.id, epoch_secs()) {
            Ok(true) => {}
            Ok(false) => {
                warn!(service = %service.id, "deploy already in progress, not starting another");
                return DeployOutcome::AlreadyDeploying;
            }
            Err(e) => {
                error!(service = %service.id, error = %e, "cannot move service to deploying");
                return DeployOutcome::Failed(e.into());
            }
        }

        let deploy_rev = next_deploy_rev();
        let result = self
            .rollout(service, nodes, &deploy_rev, creds, cancel)
            .await;

        let restored = self.state.set_service_state(&service.id, ServiceState::Running);
        if let Err(e) = &restored {
            error!(service = %service.id, error = %e, "failed to restore service state to running");
        }

        match (result, restored) {
            (Ok(report), Ok(())) => {
                info!(service = %service.id, %deploy_rev, "service has been deployed");
                DeployOutcome::Deployed(report)
            }
            (Ok(_), Err(e)) => DeployOutcome::Failed(e.into()),
            (Err(err), _) if err.is_cancellation() => {
                info!(service = %service.id, reason = %err, "service deploy cancelled");
                DeployOutcome::Failed(err)
            }
            (Err(err), _) => {
                error!(
                    service = %service.id,
                    kind = err.kind(),
                    error = %err,
                    detail = ?err,
                    "service deploy failed"
                );
                DeployOutcome::Failed(err)
            }
        }
    }

    async fn rollout(
        &self,
        service: &Service,
        nodes: &[HostNode],
        deploy_rev: &str,
        creds: Option<RegistryCredentials>,
        cancel: &CancellationToken,
    ) -> DeployResult<CleanupReport> {
        let total = self.scheduler.total_instances(service, nodes);
        let min_health = service
            .deploy_opts
            .effective_min_health(self.config.default_min_health);
        let ceiling = self.config.throttle_ceiling(total, min_health);
        let interval = self.config.dispatch_interval();
        debug!(
            service = %service.id,
            %deploy_rev,
            total,
            min_health,
            ceiling,
            candidates = nodes.len(),
            "rollout planned"
        );

        let shared = Arc::new(service.clone());
        let creds = creds.map(Arc::new);
        let mut units: JoinSet<UnitReport> = JoinSet::new();
        let mut failure: Option<DeployError> = None;

        for instance_number in 1..=total {
            if let Err(err) = self.ensure_deploying(service, cancel) {
                failure = Some(err);
                break;
            }

            let Some(node) = self.scheduler.select_node(service, instance_number, nodes) else {
                failure = Some(DeployError::Placement {
                    instance: format!("{}-{}", service.id, instance_number),
                });
                break;
            };

            info!(
                service = %service.id,
                instance = instance_number,
                node = %node.name,
                "deploying service instance"
            );
            self.dispatch(
                &mut units,
                &shared,
                node.clone(),
                instance_number,
                deploy_rev,
                creds.clone(),
            );

            while let Some(joined) = units.try_join_next() {
                settle(&service.id, joined, &mut failure);
            }
            if units.len() >= ceiling {
                info!(
                    service = %service.id,
                    in_progress = units.len(),
                    "throttling service instance deploy because of min_health limit"
                );
                if let Some(joined) = units.join_next().await {
                    settle(&service.id, joined, &mut failure);
                }
            }
            if failure.is_some() {
                break;
            }

            if instance_number < total && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }

        // Dispatched units always run to completion, even after a fatal condition.
        while let Some(joined) = units.join_next().await {
            settle(&service.id, joined, &mut failure);
        }

        if let Some(err) = failure {
            return Err(err);
        }

        self.reconcile(&shared, nodes, total, deploy_rev).await
    }

    /// The service must still be claimed by this rollout and not cancelled.
    fn ensure_deploying(&self, service: &Service, cancel: &CancellationToken) -> DeployResult<()> {
        let cancelled = || DeployError::Cancelled {
            service: service.id.clone(),
        };
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        match self.state.service_state(&service.id)? {
            Some(ServiceState::Deploying) => Ok(()),
            _ => Err(cancelled()),
        }
    }

    fn dispatch(
        &self,
        units: &mut JoinSet<UnitReport>,
        service: &Arc<Service>,
        node: HostNode,
        instance_number: u32,
        deploy_rev: &str,
        creds: Option<Arc<RegistryCredentials>>,
    ) {
        let executor = Arc::clone(&self.executor);
        let service = Arc::clone(service);
        let deploy_rev = deploy_rev.to_string();
        units.spawn(async move {
            let outcome = executor
                .deploy_instance(&service, &node, instance_number, &deploy_rev, creds.as_deref())
                .await;
            (instance_number, outcome)
        });
    }
}

/// Fold a finished unit into the rollout's first fatal condition.
fn settle(service_id: &str, joined: Result<UnitReport, JoinError>, failure: &mut Option<DeployError>) {
    let err = match joined {
        Ok((instance_number, Ok(true))) => {
            debug!(service = %service_id, instance = instance_number, "service instance deployed");
            return;
        }
        Ok((instance_number, Ok(false))) => {
            warn!(service = %service_id, instance = instance_number, "service instance failed to deploy");
            DeployError::Rollout {
                service: service_id.to_string(),
                instance_number,
            }
        }
        Ok((instance_number, Err(e))) => {
            error!(
                service = %service_id,
                instance = instance_number,
                error = %e,
                "service instance deploy errored"
            );
            DeployError::Execution(e)
        }
        Err(e) => {
            error!(service = %service_id, error = %e, "service instance task did not complete");
            DeployError::Internal(format!("instance deploy task failed: {e}"))
        }
    };
    failure.get_or_insert(err);
}
