use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::LotStatus;

/// A candidate status waiting for a second confirming recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransition {
    pub status: LotStatus,
    pub seen_at: DateTime<Utc>,
}

/// Derived per-lot state. `status` only moves through the hysteresis latch;
/// `margin` and `confidence` are recomputed from scratch on every pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotConsensus {
    pub status: LotStatus,
    pub margin: f64,
    pub confidence: f64,
    /// Time of the last committed status change.
    pub updated_at: DateTime<Utc>,
    pub pending: Option<PendingTransition>,
}

impl LotConsensus {
    pub fn initial(confidence: f64, now: DateTime<Utc>) -> Self {
        Self {
            status: LotStatus::default(),
            margin: 0.0,
            confidence,
            updated_at: now,
            pending: None,
        }
    }
}
