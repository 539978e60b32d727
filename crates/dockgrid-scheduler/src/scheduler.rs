//! Scheduler: instance counts and node selection for a service.
//!
//! The `Scheduler` is what the deployer consults before and during a
//! rollout:
//! - how many instances the service should run on a given node pool
//! - which node hosts each instance ordinal
//! - whether every ordinal can be placed at all

use tracing::debug;

use dockgrid_placement::{PlacementStrategy, strategy_for};
use dockgrid_state::{HostNode, Service};

use crate::policy::{CountPolicy, policy_for};

/// Wraps an injected placement strategy and instance-count policy.
#[derive(Debug)]
pub struct Scheduler {
    strategy: Box<dyn PlacementStrategy>,
    policy: Box<dyn CountPolicy>,
}

impl Scheduler {
    /// Create a scheduler from explicit policies.
    pub fn new(strategy: Box<dyn PlacementStrategy>, policy: Box<dyn CountPolicy>) -> Self {
        Self { strategy, policy }
    }

    /// Create the scheduler a service declares through its `strategy` and
    /// `instance_policy` fields.
    pub fn for_service(service: &Service) -> Self {
        Self::new(
            strategy_for(service.strategy),
            policy_for(service.instance_policy),
        )
    }

    /// Name of the wrapped placement strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Total instance count for a node pool of `node_pool_size`.
    pub fn instance_count(&self, node_pool_size: usize, declared_count: u32) -> u32 {
        self.policy.instance_count(node_pool_size, declared_count)
    }

    /// Total instance count for `service` over `nodes`.
    pub fn total_instances(&self, service: &Service, nodes: &[HostNode]) -> u32 {
        self.instance_count(nodes.len(), service.container_count)
    }

    /// Node for the 1-based `instance_number`, or `None` if nothing fits.
    pub fn select_node<'a>(
        &self,
        service: &Service,
        instance_number: u32,
        nodes: &'a [HostNode],
    ) -> Option<&'a HostNode> {
        let node = self.strategy.select_node(service, instance_number, nodes);
        debug!(
            service = %service.id,
            instance = instance_number,
            strategy = self.strategy.name(),
            node = ?node.map(|n| n.name.as_str()),
            "node selected"
        );
        node
    }

    /// True iff every ordinal `1..=total_instances` can be placed.
    pub fn can_deploy_all(&self, service: &Service, nodes: &[HostNode]) -> bool {
        let total = self.total_instances(service, nodes);
        (1..=total).all(|i| self.strategy.select_node(service, i, nodes).is_some())
    }

    /// Placement preview: the node for each ordinal that can be placed,
    /// in ordinal order. Ordinals without a node are skipped.
    pub fn selected_nodes<'a>(&self, service: &Service, nodes: &'a [HostNode]) -> Vec<&'a HostNode> {
        let total = self.total_instances(service, nodes);
        (1..=total)
            .filter_map(|i| self.strategy.select_node(service, i, nodes))
            .collect()
    }
}
