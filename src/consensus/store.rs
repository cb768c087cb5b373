use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::consensus::algorithm::{compute_consensus_for_lot, revise_consensus_for_lot};
use crate::consensus::config::ConsensusConfig;
use crate::models::{LotConsensus, LotStatus};
use crate::signals::SignalStore;

/// A committed status change produced by a recomputation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub lot_id: String,
    pub from: LotStatus,
    pub to: LotStatus,
    pub at: DateTime<Utc>,
}

/// One consensus entry per known lot, for the lifetime of the session.
#[derive(Debug, Clone)]
pub struct ConsensusStore {
    config: ConsensusConfig,
    order: Vec<String>,
    entries: HashMap<String, LotConsensus>,
}

impl ConsensusStore {
    /// Seeds every lot with the default status and the no-signal confidence.
    pub fn new<I, S>(lot_ids: I, config: ConsensusConfig, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = config.sanitized();
        let mut order = Vec::new();
        let mut entries = HashMap::new();
        for id in lot_ids {
            let id = id.into();
            if entries.contains_key(&id) {
                continue;
            }
            entries.insert(id.clone(), LotConsensus::initial(config.no_signal_confidence, now));
            order.push(id);
        }
        Self {
            config,
            order,
            entries,
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn get(&self, lot_id: &str) -> Option<&LotConsensus> {
        self.entries.get(lot_id)
    }

    pub fn lot_ids(&self) -> &[String] {
        &self.order
    }

    /// Recompute a single lot. Unknown lots are ignored and yield `None`.
    pub fn recompute_lot(
        &mut self,
        lot_id: &str,
        signals: &SignalStore,
        now: DateTime<Utc>,
    ) -> Option<StatusTransition> {
        let prior = self.entries.get(lot_id)?;
        let next = compute_consensus_for_lot(lot_id, prior, &signals.for_lot(lot_id), now, &self.config);
        let transition = transition_between(lot_id, prior, &next, now);
        self.entries.insert(lot_id.to_string(), next);
        transition
    }

    /// Recompute every lot in catalog order.
    pub fn recompute_all(&mut self, signals: &SignalStore, now: DateTime<Utc>) -> Vec<StatusTransition> {
        let ids = self.order.clone();
        ids.iter()
            .filter_map(|id| self.recompute_lot(id, signals, now))
            .collect()
    }

    /// Put back a previously captured entry (submission rollback).
    pub fn restore(
        &mut self,
        lot_id: &str,
        consensus: LotConsensus,
        now: DateTime<Utc>,
    ) -> Option<StatusTransition> {
        let entry = self.entries.get_mut(lot_id)?;
        let transition = transition_between(lot_id, entry, &consensus, now);
        *entry = consensus;
        transition
    }

    /// Re-derive a lot after one of its signals was withdrawn, falling back
    /// to `fallback` for any status the remaining window no longer backs.
    pub fn revise_lot(
        &mut self,
        lot_id: &str,
        fallback: &LotConsensus,
        signals: &SignalStore,
        now: DateTime<Utc>,
    ) -> Option<StatusTransition> {
        let current = self.entries.get(lot_id)?;
        let next = revise_consensus_for_lot(
            lot_id,
            current,
            fallback,
            &signals.for_lot(lot_id),
            now,
            &self.config,
        );
        let transition = transition_between(lot_id, current, &next, now);
        self.entries.insert(lot_id.to_string(), next);
        transition
    }

    /// Entries in catalog order.
    pub fn snapshot(&self) -> Vec<(String, LotConsensus)> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|c| (id.clone(), c.clone())))
            .collect()
    }
}

fn transition_between(
    lot_id: &str,
    from: &LotConsensus,
    to: &LotConsensus,
    at: DateTime<Utc>,
) -> Option<StatusTransition> {
    (from.status != to.status).then(|| StatusTransition {
        lot_id: lot_id.to_string(),
        from: from.status,
        to: to.status,
        at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Signal, SignalSource};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap()
    }

    #[test]
    fn every_lot_starts_open_with_floor_confidence() {
        let store = ConsensusStore::new(["a", "b", "a"], ConsensusConfig::default(), t0());
        assert_eq!(store.lot_ids(), &["a".to_string(), "b".to_string()]);
        for (_, entry) in store.snapshot() {
            assert_eq!(entry.status, LotStatus::Open);
            assert_eq!(entry.confidence, 0.25);
            assert_eq!(entry.updated_at, t0());
        }
    }

    #[test]
    fn recompute_all_reports_commits() {
        let mut store = ConsensusStore::new(["a", "b"], ConsensusConfig::default(), t0());
        let mut signals = SignalStore::new();
        signals.append(Signal::new("a", LotStatus::Full, SignalSource::Post, t0()));

        assert!(store.recompute_all(&signals, t0()).is_empty());
        assert_eq!(store.get("a").unwrap().pending.map(|p| p.status), Some(LotStatus::Full));

        let later = t0() + Duration::seconds(30);
        let transitions = store.recompute_all(&signals, later);
        assert_eq!(
            transitions,
            vec![StatusTransition {
                lot_id: "a".into(),
                from: LotStatus::Open,
                to: LotStatus::Full,
                at: later,
            }]
        );
        assert_eq!(store.get("b").unwrap().status, LotStatus::Open);
    }

    #[test]
    fn zero_decay_still_weighs_signals() {
        let config = ConsensusConfig {
            decay_minutes: 0.0,
            ..ConsensusConfig::default()
        };
        let mut store = ConsensusStore::new(["a"], config, t0());
        assert_eq!(store.config().decay_minutes, 15.0);

        let mut signals = SignalStore::new();
        signals.append(Signal::new("a", LotStatus::Full, SignalSource::Post, t0()));
        store.recompute_lot("a", &signals, t0() + Duration::minutes(1));
        assert!(store.get("a").unwrap().confidence > 0.9);
    }

    #[test]
    fn unknown_lot_is_ignored() {
        let mut store = ConsensusStore::new(["a"], ConsensusConfig::default(), t0());
        assert!(store.recompute_lot("zzz", &SignalStore::new(), t0()).is_none());
        assert!(store.get("zzz").is_none());
    }

    #[test]
    fn restore_replaces_entry() {
        let mut store = ConsensusStore::new(["a"], ConsensusConfig::default(), t0());
        let before = store.get("a").cloned().unwrap();
        let mut signals = SignalStore::new();
        signals.append(Signal::new("a", LotStatus::Full, SignalSource::Post, t0()));
        store.recompute_lot("a", &signals, t0());
        assert_ne!(store.get("a"), Some(&before));

        assert!(store.restore("a", before.clone(), t0()).is_none());
        assert_eq!(store.get("a"), Some(&before));
        assert!(store.restore("zzz", before, t0()).is_none());
    }

    #[test]
    fn revise_reports_a_fallback_as_transition() {
        let mut store = ConsensusStore::new(["a"], ConsensusConfig::default(), t0());
        let before = store.get("a").cloned().unwrap();
        let mut signals = SignalStore::new();
        let signal = Signal::new("a", LotStatus::Full, SignalSource::Post, t0());
        let signal_id = signal.id.clone();
        signals.append(signal);

        let later = t0() + Duration::seconds(30);
        store.recompute_lot("a", &signals, t0());
        assert!(store.recompute_lot("a", &signals, later).is_some());

        signals.remove(&signal_id);
        let later_still = later + Duration::seconds(5);
        assert_eq!(
            store.revise_lot("a", &before, &signals, later_still),
            Some(StatusTransition {
                lot_id: "a".into(),
                from: LotStatus::Full,
                to: LotStatus::Open,
                at: later_still,
            })
        );
        assert_eq!(store.get("a"), Some(&before));
    }
}
