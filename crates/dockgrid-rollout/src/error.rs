//! Deploy and execution error types.

use thiserror::Error;

use dockgrid_state::StateError;

/// Infrastructure faults raised by an [`InstanceExecutor`](crate::InstanceExecutor).
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("rpc error on node {node}: {message}")]
    Rpc { node: String, message: String },

    #[error("node {node} timed out during {operation}")]
    Timeout { node: String, operation: String },

    #[error("executor error: {0}")]
    Other(String),
}

/// Why a deploy did not complete. None of these escape `Deployer::deploy`.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("cannot find applicable node for service instance {instance}")]
    Placement { instance: String },

    #[error("halting deploy of {service}, instance {instance_number} failed")]
    Rollout { service: String, instance_number: u32 },

    #[error("halting deploy of {service}, desired state has changed")]
    Cancelled { service: String },

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("unexpected error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Short label for the failure class, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Placement { .. } => "placement",
            Self::Rollout { .. } => "rollout",
            Self::Cancelled { .. } => "cancelled",
            Self::Execution(_) => "execution",
            Self::State(_) => "state",
            Self::Internal(_) => "internal",
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

pub type DeployResult<T> = Result<T, DeployError>;
