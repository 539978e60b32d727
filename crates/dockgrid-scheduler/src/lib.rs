//! dockgrid-scheduler: translates declared intent into placements.
//!
//! The scheduler answers "how many instances, on which nodes" for a
//! service. It wraps two injected policies:
//!
//! - a [`CountPolicy`] that derives the total instance count from the
//!   node-pool size and the declared count
//! - a [`PlacementStrategy`](dockgrid_placement::PlacementStrategy) that
//!   picks a node per instance ordinal
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── CountPolicy        (fixed | one per node)
//!   └── PlacementStrategy  (spread | packed | affinity)
//! preview
//!   └── StateStore (read Service + grid nodes) → PlacementPreview
//! ```

pub mod error;
pub mod policy;
pub mod preview;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use policy::{CountPolicy, FixedCount, OnePerNode, policy_for};
pub use preview::{Assignment, PlacementPreview, candidate_nodes, preview};
pub use scheduler::Scheduler;
