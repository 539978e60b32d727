//! Instance-count policies.

use std::fmt;

use dockgrid_state::InstancePolicy;

/// Derives the total number of instances for a rollout.
///
/// Must be pure: the same inputs always produce the same count.
pub trait CountPolicy: Send + Sync + fmt::Debug {
    fn instance_count(&self, node_pool_size: usize, declared_count: u32) -> u32;
}

/// Run exactly the declared number of instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedCount;

impl CountPolicy for FixedCount {
    fn instance_count(&self, _node_pool_size: usize, declared_count: u32) -> u32 {
        declared_count
    }
}

/// Run one instance on every available node.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnePerNode;

impl CountPolicy for OnePerNode {
    fn instance_count(&self, node_pool_size: usize, _declared_count: u32) -> u32 {
        u32::try_from(node_pool_size).unwrap_or(u32::MAX)
    }
}

/// Build the count policy declared by a service.
pub fn policy_for(policy: InstancePolicy) -> Box<dyn CountPolicy> {
    match policy {
        InstancePolicy::Fixed => Box::new(FixedCount),
        InstancePolicy::PerNode => Box::new(OnePerNode),
    }
}
