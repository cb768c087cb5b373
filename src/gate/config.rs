use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Geofence radius for report submission.
pub const DEFAULT_MAX_DISTANCE_METERS: f64 = 150.0;

/// Minimum spacing between two reports for the same lot from one device.
pub const DEFAULT_COOLDOWN_MINUTES: i64 = 20;

/// What to do with an optimistically accepted signal whose remote insert failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailurePolicy {
    /// Remove the signal and restore the lot's prior consensus.
    RollBack,
    /// Keep the signal for local display and only log the failure.
    Retain,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::RollBack
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GateConfig {
    pub cooldown_minutes: i64,
    pub max_distance_meters: f64,
    pub failure_policy: FailurePolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            max_distance_meters: DEFAULT_MAX_DISTANCE_METERS,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl GateConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::minutes(self.cooldown_minutes.max(0))
    }
}
