//! dockgrid rollouts: deploy a service revision across a node pool.
//!
//! The [`Deployer`] drives a full deployment of a service: it asks the
//! scheduler how many instances to run and where, dispatches each instance
//! to an [`InstanceExecutor`] as a concurrent unit of work bounded by the
//! service's minimum-health throttle, and once the rollout has succeeded
//! removes instances left over from earlier revisions.
//!
//! Every failure class (no feasible node, an unhealthy instance, an
//! executor fault, cancellation) is contained inside `deploy()`: the
//! service always ends up back in `running` and the caller sees `false`.
//!
//! # Components
//!
//! - **`deployer`**: Rollout loop, throttle and failure containment
//! - **`reconcile`**: Post-rollout cleanup of stale revisions
//! - **`executor`**: The single-instance executor seam
//! - **`registry`**: Registry name and credential resolution for images
//! - **`config`**: Pacing, in-flight cap and min-health defaults
//! - **`revision`**: Deploy revision markers

pub mod config;
pub mod deployer;
pub mod error;
pub mod executor;
pub mod reconcile;
pub mod registry;
pub mod revision;

pub use config::DeployerConfig;
pub use deployer::{DeployOutcome, Deployer};
pub use error::{DeployError, ExecutionError};
pub use executor::InstanceExecutor;
pub use reconcile::CleanupReport;
pub use registry::{DEFAULT_REGISTRY, creds_for_registry, registry_name};
pub use revision::next_deploy_rev;
pub use tokio_util::sync::CancellationToken;
