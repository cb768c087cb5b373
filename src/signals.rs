//! Retained window of signals, append/prune only.

use chrono::{DateTime, Utc};

use crate::models::Signal;

#[derive(Debug, Clone, Default)]
pub struct SignalStore {
    signals: Vec<Signal>,
}

impl SignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, signal: Signal) {
        self.signals.push(signal);
    }

    /// Drops every signal older than `max_age_minutes`. Returns how many went.
    pub fn prune(&mut self, now: DateTime<Utc>, max_age_minutes: f64) -> usize {
        let before = self.signals.len();
        self.signals
            .retain(|signal| signal.age_minutes(now) <= max_age_minutes);
        before - self.signals.len()
    }

    /// Copies of the signals currently held for a lot, in arbitrary order.
    pub fn for_lot(&self, lot_id: &str) -> Vec<Signal> {
        self.signals
            .iter()
            .filter(|signal| signal.lot_id == lot_id)
            .cloned()
            .collect()
    }

    /// Compensating removal for a rolled-back submission.
    pub fn remove(&mut self, signal_id: &str) -> Option<Signal> {
        let idx = self.signals.iter().position(|s| s.id == signal_id)?;
        Some(self.signals.remove(idx))
    }

    pub fn contains(&self, signal_id: &str) -> bool {
        self.signals.iter().any(|s| s.id == signal_id)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
