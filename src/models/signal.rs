//! Signal data model.
//!
//! A signal is one timestamped status report for a lot. Signals are created
//! by the submission gate (or hydrated from the remote report table), owned
//! by the `SignalStore`, and never edited in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::LotStatus;

/// Where a report came from. Carried for analytics only; all sources vote
/// with the same weight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// A fresh report composed from scratch.
    Post,
    /// Confirmation of the currently displayed status.
    Agree,
    /// A correction submitted from the lot sheet.
    Update,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Post => "post",
            SignalSource::Agree => "agree",
            SignalSource::Update => "update",
        }
    }

    /// Unrecognised provenance tags fall back to `Post`; the tag never
    /// influences the vote.
    pub fn parse(value: &str) -> SignalSource {
        match value {
            "agree" => SignalSource::Agree,
            "update" => SignalSource::Update,
            _ => SignalSource::Post,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: String,
    pub lot_id: String,
    pub status: LotStatus,
    pub created_at: DateTime<Utc>,
    pub source: SignalSource,
}

impl Signal {
    pub fn new(
        lot_id: impl Into<String>,
        status: LotStatus,
        source: SignalSource,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            lot_id: lot_id.into(),
            status,
            created_at,
            source,
        }
    }

    /// Age in fractional minutes. Negative when `created_at` is ahead of `now`.
    pub fn age_minutes(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_milliseconds() as f64 / 60_000.0
    }
}
