//! Placement strategies: spread, packed, affinity.

use std::fmt;

use tracing::debug;

use dockgrid_state::{HostNode, PlacementKind, Service};

use crate::scorer::{affinity_matches, eligible_nodes, fits, packing_score};

/// Chooses the host node for one instance ordinal of a service.
///
/// Implementations must be deterministic: the same service, ordinal and
/// candidate set always yield the same answer. Returning `None` means no
/// node can take the instance; it is a normal outcome, not an error.
pub trait PlacementStrategy: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Pick a node for the 1-based `instance_number`.
    fn select_node<'a>(
        &self,
        service: &Service,
        instance_number: u32,
        nodes: &'a [HostNode],
    ) -> Option<&'a HostNode>;
}

/// Build the strategy declared by a service.
pub fn strategy_for(kind: PlacementKind) -> Box<dyn PlacementStrategy> {
    match kind {
        PlacementKind::Spread => Box::new(Spread),
        PlacementKind::Packed => Box::new(Packed),
        PlacementKind::Affinity => Box::new(Affinity),
    }
}

/// Index into a rotation of `len` slots for a 1-based ordinal.
fn rotation_slot(instance_number: u32, len: usize) -> Option<usize> {
    if instance_number == 0 || len == 0 {
        return None;
    }
    Some((instance_number as usize - 1) % len)
}

/// Rotate ordinals across eligible nodes: ordinal `i` lands on the
/// `(i - 1) % n`-th node by id.
#[derive(Debug, Clone, Copy, Default)]
pub struct Spread;

impl PlacementStrategy for Spread {
    fn name(&self) -> &'static str {
        "spread"
    }

    fn select_node<'a>(
        &self,
        service: &Service,
        instance_number: u32,
        nodes: &'a [HostNode],
    ) -> Option<&'a HostNode> {
        let eligible = eligible_nodes(service, nodes);
        let slot = rotation_slot(instance_number, eligible.len())?;
        Some(eligible[slot])
    }
}

/// Best-fit bin-packing by memory.
///
/// Ordinals `1..=i` are packed in order onto the node that will be the
/// most full after placement while still fitting, so ordinal `i` gets the
/// node it would receive in a full packing pass. Ties go to the lowest id.
#[derive(Debug, Clone, Copy, Default)]
pub struct Packed;

impl PlacementStrategy for Packed {
    fn name(&self) -> &'static str {
        "packed"
    }

    fn select_node<'a>(
        &self,
        service: &Service,
        instance_number: u32,
        nodes: &'a [HostNode],
    ) -> Option<&'a HostNode> {
        if instance_number == 0 {
            return None;
        }
        let eligible = eligible_nodes(service, nodes);
        let mut used: Vec<u64> = eligible.iter().map(|n| n.used_memory_bytes).collect();
        let mut chosen = None;

        for ordinal in 1..=instance_number {
            let mut best: Option<(usize, f64)> = None;
            for (idx, node) in eligible.iter().enumerate() {
                if !fits(node.capacity_memory_bytes, used[idx], service.memory_bytes) {
                    continue;
                }
                let score = packing_score(
                    node.capacity_memory_bytes,
                    used[idx].saturating_add(service.memory_bytes),
                );
                if best.is_none_or(|(_, s)| score > s) {
                    best = Some((idx, score));
                }
            }

            let Some((idx, _)) = best else {
                debug!(
                    service = %service.id,
                    instance = ordinal,
                    "no node has capacity left"
                );
                return None;
            };
            used[idx] = used[idx].saturating_add(service.memory_bytes);
            chosen = Some(idx);
        }

        chosen.map(|idx| eligible[idx])
    }
}

/// Prefer nodes that match the most `service.affinity` labels, rotating
/// ordinals within that preferred tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct Affinity;

impl PlacementStrategy for Affinity {
    fn name(&self) -> &'static str {
        "affinity"
    }

    fn select_node<'a>(
        &self,
        service: &Service,
        instance_number: u32,
        nodes: &'a [HostNode],
    ) -> Option<&'a HostNode> {
        let eligible = eligible_nodes(service, nodes);
        let best = eligible
            .iter()
            .map(|n| affinity_matches(service, n))
            .max()?;
        let tier: Vec<&HostNode> = eligible
            .into_iter()
            .filter(|n| affinity_matches(service, n) == best)
            .collect();
        let slot = rotation_slot(instance_number, tier.len())?;
        Some(tier[slot])
    }
}
