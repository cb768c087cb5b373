use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Lot, LotConsensus, LotStatus};

/// Confidence at or above which the map ring is drawn solid.
pub const CONFIDENT_THRESHOLD: f64 = 0.6;

const RING_BASE_METERS: f64 = 70.0;
const RING_SPAN_METERS: f64 = 140.0;

/// Render-ready projection of one lot's consensus.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotView {
    pub lot_id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub status: LotStatus,
    pub label: &'static str,
    pub color: &'static str,
    pub confidence: f64,
    pub pending: Option<LotStatus>,
    pub updated_label: String,
    pub ring_radius_m: f64,
    pub is_confident: bool,
}

impl LotView {
    pub fn new(lot: &Lot, consensus: &LotConsensus, now: DateTime<Utc>) -> Self {
        Self {
            lot_id: lot.id.clone(),
            name: lot.name.clone(),
            lat: lot.lat,
            lng: lot.lng,
            status: consensus.status,
            label: consensus.status.label(),
            color: consensus.status.color(),
            confidence: consensus.confidence,
            pending: consensus.pending.map(|p| p.status),
            updated_label: updated_label(consensus.updated_at, now),
            ring_radius_m: RING_BASE_METERS + RING_SPAN_METERS * consensus.confidence,
            is_confident: consensus.confidence >= CONFIDENT_THRESHOLD,
        }
    }
}

/// "Just now" under a minute, otherwise whole minutes since the last commit.
pub fn updated_label(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = ((now - updated_at).num_milliseconds() as f64 / 60_000.0)
        .round()
        .max(0.0) as i64;
    if minutes < 1 {
        "Just now".to_string()
    } else {
        format!("{minutes}m ago")
    }
}
