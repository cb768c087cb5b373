use chrono::{DateTime, Utc};

use crate::consensus::config::ConsensusConfig;
use crate::models::{LotStatus, Signal, STATUS_COUNT};

/// Per-status decayed vote sums, indexed by `LotStatus::index`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusWeights([f64; STATUS_COUNT]);

/// One entry of the ranked vote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedStatus {
    pub status: LotStatus,
    pub weight: f64,
}

impl StatusWeights {
    pub fn get(&self, status: LotStatus) -> f64 {
        self.0[status.index()]
    }

    pub fn add(&mut self, status: LotStatus, weight: f64) {
        if weight.is_finite() && weight > 0.0 {
            self.0[status.index()] += weight;
        }
    }

    /// Statuses by descending weight. The sort is stable, so equal weights
    /// keep canonical order.
    pub fn ranked(&self) -> [RankedStatus; STATUS_COUNT] {
        let mut ranked = LotStatus::ALL.map(|status| RankedStatus {
            status,
            weight: self.get(status),
        });
        ranked.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        ranked
    }
}

/// Weight of a single signal at `now`: `exp(-age / decay)`, zero past the
/// cutoff. Signals stamped in the future count as brand new.
pub fn decay_weight(signal: &Signal, now: DateTime<Utc>, config: &ConsensusConfig) -> f64 {
    let age = signal.age_minutes(now).max(0.0);
    if age > config.max_signal_age_minutes {
        return 0.0;
    }
    (-age / config.decay_minutes).exp()
}

pub fn is_fresh(signal: &Signal, now: DateTime<Utc>, config: &ConsensusConfig) -> bool {
    signal.age_minutes(now) <= config.max_signal_age_minutes
}

/// Sum decayed weights per status over the fresh subset of `signals`.
pub fn tally<'a, I>(signals: I, now: DateTime<Utc>, config: &ConsensusConfig) -> StatusWeights
where
    I: IntoIterator<Item = &'a Signal>,
{
    let mut weights = StatusWeights::default();
    for signal in signals {
        if is_fresh(signal, now, config) {
            weights.add(signal.status, decay_weight(signal, now, config));
        }
    }
    weights
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn confidence(margin: f64, has_signals: bool, config: &ConsensusConfig) -> f64 {
    if has_signals {
        sigmoid(config.confidence_gain * margin)
    } else {
        config.no_signal_confidence
    }
}
