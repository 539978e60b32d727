//! Node eligibility and scoring for placement decisions.
//!
//! Evaluates candidate nodes using:
//! - **Constraints**: reject disconnected nodes and nodes missing a required label
//! - **Affinity**: count how many preferred labels a node carries
//! - **Bin-packing** (best-fit): how full a node will be after placement

use dockgrid_state::{HostNode, Service};

/// Nodes that may host instances of `service`, sorted by node id.
///
/// A node is eligible when it is connected and carries every label listed
/// in `service.constraints` with the same value.
pub fn eligible_nodes<'a>(service: &Service, nodes: &'a [HostNode]) -> Vec<&'a HostNode> {
    let mut eligible: Vec<&HostNode> = nodes
        .iter()
        .filter(|node| node.connected)
        .filter(|node| {
            service
                .constraints
                .iter()
                .all(|(k, v)| node.labels.get(k).is_some_and(|nv| nv == v))
        })
        .collect();
    eligible.sort_by(|a, b| a.id.cmp(&b.id));
    eligible
}

/// Number of `service.affinity` labels the node matches.
pub fn affinity_matches(service: &Service, node: &HostNode) -> usize {
    service
        .affinity
        .iter()
        .filter(|(k, v)| node.labels.get(*k).is_some_and(|nv| nv == *v))
        .count()
}

/// Bin-packing score: projected utilization after placement, 0.0..=100.0.
///
/// Higher = more packed = better for bin-packing. Nodes with unknown
/// capacity score a neutral 50.
pub fn packing_score(capacity_bytes: u64, projected_used_bytes: u64) -> f64 {
    if capacity_bytes > 0 {
        (projected_used_bytes as f64 / capacity_bytes as f64).min(1.0) * 100.0
    } else {
        50.0
    }
}

/// Whether `extra` bytes still fit on a node with the given usage.
///
/// Zero capacity means the node did not report it; such nodes always fit.
pub fn fits(capacity_bytes: u64, used_bytes: u64, extra: u64) -> bool {
    capacity_bytes == 0 || used_bytes.saturating_add(extra) <= capacity_bytes
}
