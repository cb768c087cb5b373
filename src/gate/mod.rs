//! Report submission gate: cooldown and presence checks that a candidate
//! report must clear before it becomes a signal.

pub mod config;
pub mod cooldown;
pub mod error;
pub mod presence;
pub mod submission;

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use config::{FailurePolicy, GateConfig};
pub use cooldown::CooldownTracker;
pub use error::{format_remaining, ReportError};
pub use presence::{FixedLocationProvider, LocationProvider, PermissionStatus};
pub use submission::{PendingSubmission, SubmissionState};

use crate::geo::{distance_meters, GeoPoint};
use crate::kv::KeyValueStore;
use crate::models::Lot;

/// Outcome of a passed presence check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenceFix {
    pub distance_m: f64,
}

pub struct ReportGate {
    config: GateConfig,
    cooldowns: CooldownTracker,
    location: Arc<dyn LocationProvider>,
}

impl ReportGate {
    pub fn new(
        config: GateConfig,
        store: Arc<dyn KeyValueStore>,
        location: Arc<dyn LocationProvider>,
    ) -> Self {
        let cooldowns = CooldownTracker::new(store, config.cooldown());
        Self {
            config,
            cooldowns,
            location,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Cooldown first, then presence. Nothing is mutated on either path.
    pub async fn validate(&self, lot: &Lot, now: DateTime<Utc>) -> Result<PresenceFix, ReportError> {
        self.check_cooldown(&lot.id, now).await?;
        self.check_presence(lot).await
    }

    pub async fn check_cooldown(&self, lot_id: &str, now: DateTime<Utc>) -> Result<(), ReportError> {
        match self.cooldowns.remaining(lot_id, now).await? {
            Some(remaining) => Err(ReportError::OnCooldown { remaining }),
            None => Ok(()),
        }
    }

    /// Permission, then a single fix.
    pub async fn locate(&self) -> Result<GeoPoint, ReportError> {
        if self.location.request_permission().await? != PermissionStatus::Granted {
            return Err(ReportError::PermissionDenied);
        }

        self.location
            .current_position()
            .await
            .map_err(|err| ReportError::LocationUnavailable(err.to_string()))
    }

    pub async fn check_presence(&self, lot: &Lot) -> Result<PresenceFix, ReportError> {
        let position = self.locate().await?;
        let distance_m = distance_meters(position, lot.location());
        if distance_m > self.config.max_distance_meters {
            return Err(ReportError::OutOfRange {
                distance_m,
                max_m: self.config.max_distance_meters,
            });
        }

        Ok(PresenceFix { distance_m })
    }

    /// Arm the cooldown once a report has been kept.
    pub async fn record_accepted(
        &self,
        lot_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ReportError> {
        Ok(self.cooldowns.start(lot_id, now).await?)
    }
}
