//! dockgrid placement: decides which host node runs a service instance.
//!
//! This crate does NOT decide how many instances run or dispatch any work
//! (that's `dockgrid-scheduler` and `dockgrid-rollout`). It answers one
//! question: given a service, an instance ordinal, and the candidate nodes,
//! which node should host that ordinal?
//!
//! Every strategy is a pure function of its inputs, so asking twice with
//! the same candidate set yields the same node.
//!
//! # Components
//!
//! - **`strategy`**: The `PlacementStrategy` trait and its variants
//! - **`scorer`**: Node eligibility, affinity matching and packing scores

pub mod scorer;
pub mod strategy;

pub use scorer::{affinity_matches, eligible_nodes, packing_score};
pub use strategy::{Affinity, Packed, PlacementStrategy, Spread, strategy_for};
