//! Placement preview: what a deploy would do, without doing it.
//!
//! Loads a service and its grid's nodes from the state store and runs the
//! service's scheduler over them. Nothing is written back.

use serde::{Deserialize, Serialize};
use tracing::debug;

use dockgrid_placement::eligible_nodes;
use dockgrid_state::{HostNode, Service, StateStore};

use crate::error::{SchedulerError, SchedulerResult};
use crate::scheduler::Scheduler;

/// Node chosen for a single ordinal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub instance_number: u32,
    /// `None` when no node can host this ordinal.
    pub node_id: Option<String>,
    pub node_name: Option<String>,
}

/// Result of previewing a service's placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementPreview {
    pub service_id: String,
    pub strategy: String,
    pub candidate_nodes: usize,
    pub total_instances: u32,
    pub can_deploy_all: bool,
    pub assignments: Vec<Assignment>,
}

/// Nodes of the service's grid that may host it: connected and carrying
/// every constraint label, ordered by id.
pub fn candidate_nodes(state: &StateStore, service: &Service) -> SchedulerResult<Vec<HostNode>> {
    let nodes = state.list_nodes(&service.grid)?;
    Ok(eligible_nodes(service, &nodes).into_iter().cloned().collect())
}

/// Preview the placement of a stored service over its grid's nodes.
pub fn preview(state: &StateStore, service_id: &str) -> SchedulerResult<PlacementPreview> {
    let service = state
        .get_service(service_id)?
        .ok_or_else(|| SchedulerError::ServiceNotFound(service_id.to_string()))?;
    let nodes = candidate_nodes(state, &service)?;
    let scheduler = Scheduler::for_service(&service);

    let total_instances = scheduler.total_instances(&service, &nodes);
    let assignments: Vec<Assignment> = (1..=total_instances)
        .map(|i| {
            let node = scheduler.select_node(&service, i, &nodes);
            Assignment {
                instance_number: i,
                node_id: node.map(|n| n.id.clone()),
                node_name: node.map(|n| n.name.clone()),
            }
        })
        .collect();
    let can_deploy_all = assignments.iter().all(|a| a.node_id.is_some());

    debug!(
        service = %service_id,
        total_instances,
        can_deploy_all,
        "placement previewed"
    );

    Ok(PlacementPreview {
        service_id: service_id.to_string(),
        strategy: scheduler.strategy_name().to_string(),
        candidate_nodes: nodes.len(),
        total_instances,
        can_deploy_all,
        assignments,
    })
}
