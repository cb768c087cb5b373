use chrono::{DateTime, Utc};

use crate::consensus::{ConsensusStore, StatusTransition};
use crate::models::{LotConsensus, Signal};
use crate::signals::SignalStore;

/// Lifecycle of one accepted report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    /// Built but not yet visible.
    Prepared,
    /// Appended to the window and reflected in the lot's consensus.
    Accepted,
    /// Remote insert confirmed, or the failure was tolerated.
    Persisted,
    /// Signal removed and the lot's consensus re-derived without it.
    RolledBack,
}

/// Optimistic submission with a single compensating path.
///
/// `accept` captures the lot's consensus on both sides of the append. When
/// nothing else touched the lot in between, `rollback` puts the earlier entry
/// back verbatim. Otherwise the lot is revised from the current window so
/// passes and other signals that landed meanwhile are kept.
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    signal: Signal,
    prior: Option<LotConsensus>,
    accepted: Option<LotConsensus>,
    state: SubmissionState,
}

impl PendingSubmission {
    pub fn new(signal: Signal) -> Self {
        Self {
            signal,
            prior: None,
            accepted: None,
            state: SubmissionState::Prepared,
        }
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    /// Append the signal and recompute its lot right away.
    pub fn accept(
        &mut self,
        signals: &mut SignalStore,
        consensus: &mut ConsensusStore,
        now: DateTime<Utc>,
    ) -> Option<StatusTransition> {
        if self.state != SubmissionState::Prepared {
            return None;
        }
        self.prior = consensus.get(&self.signal.lot_id).cloned();
        signals.append(self.signal.clone());
        self.state = SubmissionState::Accepted;
        let transition = consensus.recompute_lot(&self.signal.lot_id, signals, now);
        self.accepted = consensus.get(&self.signal.lot_id).cloned();
        transition
    }

    pub fn commit(&mut self) {
        if self.state == SubmissionState::Accepted {
            self.state = SubmissionState::Persisted;
        }
    }

    /// Undo `accept`. Only an accepted submission moves to `RolledBack`;
    /// check `state` to tell a no-op from a rollback without a transition.
    pub fn rollback(
        &mut self,
        signals: &mut SignalStore,
        consensus: &mut ConsensusStore,
        now: DateTime<Utc>,
    ) -> Option<StatusTransition> {
        if self.state != SubmissionState::Accepted {
            return None;
        }
        self.state = SubmissionState::RolledBack;
        signals.remove(&self.signal.id);

        let lot_id = &self.signal.lot_id;
        let prior = self.prior.take()?;
        let accepted = self.accepted.take();
        if consensus.get(lot_id) == accepted.as_ref() {
            consensus.restore(lot_id, prior, now)
        } else {
            consensus.revise_lot(lot_id, &prior, signals, now)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ConsensusConfig;
    use crate::models::{LotStatus, SignalSource};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap()
    }

    fn stores() -> (SignalStore, ConsensusStore) {
        (
            SignalStore::new(),
            ConsensusStore::new(["lot_79"], ConsensusConfig::default(), t0()),
        )
    }

    #[test]
    fn accept_makes_signal_visible() {
        let (mut signals, mut consensus) = stores();
        let mut submission =
            PendingSubmission::new(Signal::new("lot_79", LotStatus::Full, SignalSource::Post, t0()));

        submission.accept(&mut signals, &mut consensus, t0());
        assert_eq!(submission.state(), SubmissionState::Accepted);
        assert!(signals.contains(&submission.signal().id));
        assert_eq!(
            consensus.get("lot_79").unwrap().pending.map(|p| p.status),
            Some(LotStatus::Full)
        );

        submission.commit();
        assert_eq!(submission.state(), SubmissionState::Persisted);
        assert!(submission.rollback(&mut signals, &mut consensus, t0()).is_none());
        assert_eq!(submission.state(), SubmissionState::Persisted);
        assert!(signals.contains(&submission.signal().id));
    }

    #[test]
    fn rollback_restores_prior_consensus() {
        let (mut signals, mut consensus) = stores();
        let before = consensus.get("lot_79").cloned().unwrap();
        let mut submission =
            PendingSubmission::new(Signal::new("lot_79", LotStatus::Full, SignalSource::Update, t0()));

        submission.accept(&mut signals, &mut consensus, t0());
        assert!(submission.rollback(&mut signals, &mut consensus, t0()).is_none());

        assert_eq!(submission.state(), SubmissionState::RolledBack);
        assert!(signals.is_empty());
        assert_eq!(consensus.get("lot_79"), Some(&before));
        assert!(submission.rollback(&mut signals, &mut consensus, t0()).is_none());
    }

    #[test]
    fn rollback_undoes_a_commit_made_on_accept() {
        let (mut signals, mut consensus) = stores();
        signals.append(Signal::new("lot_79", LotStatus::Full, SignalSource::Post, t0()));
        consensus.recompute_lot("lot_79", &signals, t0());
        let before = consensus.get("lot_79").cloned().unwrap();
        assert_eq!(before.status, LotStatus::Open);

        let later = t0() + Duration::seconds(10);
        let mut submission =
            PendingSubmission::new(Signal::new("lot_79", LotStatus::Full, SignalSource::Agree, later));
        assert!(submission.accept(&mut signals, &mut consensus, later).is_some());
        assert_eq!(consensus.get("lot_79").unwrap().status, LotStatus::Full);

        let transition = submission.rollback(&mut signals, &mut consensus, later);
        assert_eq!(transition.map(|t| (t.from, t.to)), Some((LotStatus::Full, LotStatus::Open)));
        assert_eq!(consensus.get("lot_79"), Some(&before));
        assert_eq!(signals.len(), 1);
    }

    #[test]
    fn rollback_keeps_passes_that_ran_after_accept() {
        let (mut signals, mut consensus) = stores();
        let mut submission =
            PendingSubmission::new(Signal::new("lot_79", LotStatus::Full, SignalSource::Post, t0()));
        submission.accept(&mut signals, &mut consensus, t0());

        let later = t0() + Duration::seconds(5);
        signals.append(Signal::new("lot_79", LotStatus::Full, SignalSource::Post, later));
        signals.append(Signal::new("lot_79", LotStatus::Full, SignalSource::Post, later));
        assert!(consensus.recompute_lot("lot_79", &signals, later).is_some());

        let tick = t0() + Duration::seconds(30);
        consensus.recompute_lot("lot_79", &signals, tick);
        assert!(submission.rollback(&mut signals, &mut consensus, tick).is_none());

        let entry = consensus.get("lot_79").unwrap();
        assert_eq!(entry.status, LotStatus::Full);
        assert_eq!(entry.updated_at, later);
        assert!(entry.confidence > 0.25);
        assert!(entry.pending.is_none());
        assert_eq!(signals.len(), 2);
    }

    #[test]
    fn accept_is_single_shot() {
        let (mut signals, mut consensus) = stores();
        let mut submission =
            PendingSubmission::new(Signal::new("lot_79", LotStatus::Full, SignalSource::Post, t0()));
        submission.accept(&mut signals, &mut consensus, t0());
        submission.accept(&mut signals, &mut consensus, t0());
        assert_eq!(signals.len(), 1);
    }
}
