//! Deployer tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use dockgrid_state::DEFAULT_MIN_HEALTH;

/// Absorbs float error in `1.0 - min_health` (e.g. `10 * (1 - 0.8)`).
const FLOOR_EPSILON: f64 = 1e-9;

/// Tuning knobs for a [`Deployer`](crate::Deployer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    /// Pause between instance dispatches, in milliseconds.
    pub dispatch_interval_ms: u64,
    /// Absolute cap on concurrently pending instance deploys.
    pub max_in_flight: usize,
    /// `min_health` used when a service does not declare one.
    pub default_min_health: f64,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: 100,
            max_in_flight: 20,
            default_min_health: DEFAULT_MIN_HEALTH,
        }
    }
}

impl DeployerConfig {
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    /// Maximum number of instances allowed to be in flight at once:
    /// `floor(total * (1 - min_health))`, at least 1 and at most
    /// `max_in_flight`. A zero ceiling would never let a rollout start.
    pub fn throttle_ceiling(&self, total_instances: u32, min_health: f64) -> usize {
        let unavailable = (f64::from(total_instances) * (1.0 - min_health) + FLOOR_EPSILON).floor();
        let unavailable = if unavailable.is_finite() && unavailable > 0.0 {
            unavailable as usize
        } else {
            0
        };
        unavailable.clamp(1, self.max_in_flight.max(1))
    }
}
