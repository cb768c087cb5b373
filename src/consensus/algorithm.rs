use chrono::{DateTime, Utc};

use crate::consensus::config::ConsensusConfig;
use crate::consensus::scoring::{confidence, is_fresh, tally, RankedStatus};
use crate::models::{LotConsensus, PendingTransition, Signal};

/// Decayed vote over the fresh signals for one lot.
struct Vote {
    leader: RankedStatus,
    margin: f64,
    has_signals: bool,
}

fn vote(lot_id: &str, signals: &[Signal], now: DateTime<Utc>, config: &ConsensusConfig) -> Vote {
    let fresh: Vec<&Signal> = signals
        .iter()
        .filter(|signal| signal.lot_id == lot_id && is_fresh(signal, now, config))
        .collect();

    let ranked = tally(fresh.iter().copied(), now, config).ranked();
    let runner_weight = ranked.get(1).map(|r| r.weight).unwrap_or(0.0);

    Vote {
        leader: ranked[0],
        margin: (ranked[0].weight - runner_weight).max(0.0),
        has_signals: !fresh.is_empty(),
    }
}

/// Recompute one lot's consensus from its prior state and signal set.
///
/// Infallible and pure: the same `(prior, signals, now)` always yields the
/// same result. `signals` may contain other lots' or stale entries; only
/// fresh signals for `lot_id` vote.
///
/// The displayed status moves through a two-pass latch. A new leader is
/// first recorded as `pending`; it is committed only when it still leads,
/// with a positive margin, on a later pass. Ties and a return of the
/// current status to the lead clear the latch.
pub fn compute_consensus_for_lot(
    lot_id: &str,
    prior: &LotConsensus,
    signals: &[Signal],
    now: DateTime<Utc>,
    config: &ConsensusConfig,
) -> LotConsensus {
    let Vote {
        leader: top,
        margin,
        has_signals,
    } = vote(lot_id, signals, now, config);

    let mut status = prior.status;
    let mut pending = prior.pending;
    let mut updated_at = prior.updated_at;

    if !has_signals {
        pending = None;
    } else if top.status == prior.status {
        pending = None;
    } else if margin > 0.0 {
        match pending {
            Some(candidate) if candidate.status == top.status => {
                status = top.status;
                updated_at = now;
                pending = None;
            }
            _ => {
                pending = Some(PendingTransition {
                    status: top.status,
                    seen_at: now,
                });
            }
        }
    } else {
        pending = None;
    }

    LotConsensus {
        status,
        margin,
        confidence: confidence(margin, has_signals, config),
        updated_at,
        pending,
    }
}

/// Re-derive a lot's consensus after a signal was withdrawn, without
/// counting as a latch pass.
///
/// `current` is the live entry and `fallback` the entry displayed before the
/// withdrawn signal arrived. A displayed status that moved away from
/// `fallback` is kept only while the remaining window still backs it with a
/// positive margin. A pending candidate survives only while it still leads.
pub fn revise_consensus_for_lot(
    lot_id: &str,
    current: &LotConsensus,
    fallback: &LotConsensus,
    signals: &[Signal],
    now: DateTime<Utc>,
    config: &ConsensusConfig,
) -> LotConsensus {
    let Vote {
        leader,
        margin,
        has_signals,
    } = vote(lot_id, signals, now, config);
    let leads = has_signals && margin > 0.0;

    let (status, updated_at) =
        if current.status != fallback.status && !(leads && leader.status == current.status) {
            (fallback.status, fallback.updated_at)
        } else {
            (current.status, current.updated_at)
        };

    let pending = current
        .pending
        .filter(|candidate| leads && candidate.status == leader.status && leader.status != status);

    LotConsensus {
        status,
        margin,
        confidence: confidence(margin, has_signals, config),
        updated_at,
        pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LotStatus, SignalSource};
    use chrono::{Duration, TimeZone};

    const LOT: &str = "lot_79";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap()
    }

    fn initial() -> LotConsensus {
        LotConsensus::initial(0.25, t0())
    }

    fn report(status: LotStatus, at: DateTime<Utc>) -> Signal {
        Signal::new(LOT, status, SignalSource::Post, at)
    }

    fn run(prior: &LotConsensus, signals: &[Signal], now: DateTime<Utc>) -> LotConsensus {
        compute_consensus_for_lot(LOT, prior, signals, now, &ConsensusConfig::default())
    }

    #[test]
    fn untouched_lot_reports_confidence_floor() {
        let next = run(&initial(), &[], t0());
        assert_eq!(next.status, LotStatus::Open);
        assert_eq!(next.confidence, 0.25);
        assert_eq!(next.margin, 0.0);
        assert!(next.pending.is_none());
    }

    #[test]
    fn single_outlier_only_sets_pending() {
        let signals = vec![report(LotStatus::Full, t0())];
        let next = run(&initial(), &signals, t0());

        assert_eq!(next.status, LotStatus::Open);
        assert_eq!(
            next.pending,
            Some(PendingTransition {
                status: LotStatus::Full,
                seen_at: t0()
            })
        );
        assert_eq!(next.updated_at, t0());
        assert!((next.margin - 1.0).abs() < 1e-12);
    }

    #[test]
    fn second_pass_with_same_leader_commits() {
        let signals = vec![report(LotStatus::Full, t0())];
        let first = run(&initial(), &signals, t0());
        let later = t0() + Duration::seconds(30);
        let second = run(&first, &signals, later);

        assert_eq!(second.status, LotStatus::Full);
        assert_eq!(second.updated_at, later);
        assert!(second.pending.is_none());
    }

    #[test]
    fn pending_for_other_status_restarts_clock() {
        let mut prior = initial();
        prior.pending = Some(PendingTransition {
            status: LotStatus::Filling,
            seen_at: t0(),
        });
        let later = t0() + Duration::seconds(30);
        let next = run(&prior, &[report(LotStatus::Full, later)], later);

        assert_eq!(next.status, LotStatus::Open);
        assert_eq!(
            next.pending,
            Some(PendingTransition {
                status: LotStatus::Full,
                seen_at: later
            })
        );
    }

    #[test]
    fn tie_clears_pending_without_transition() {
        let mut prior = initial();
        prior.pending = Some(PendingTransition {
            status: LotStatus::Full,
            seen_at: t0(),
        });
        let signals = vec![report(LotStatus::Full, t0()), report(LotStatus::Filling, t0())];
        let next = run(&prior, &signals, t0());

        assert_eq!(next.margin, 0.0);
        assert_eq!(next.status, LotStatus::Open);
        assert!(next.pending.is_none());
        assert_eq!(next.confidence, 0.5);
    }

    #[test]
    fn leader_matching_display_clears_pending() {
        let mut prior = initial();
        prior.pending = Some(PendingTransition {
            status: LotStatus::Full,
            seen_at: t0(),
        });
        let signals = vec![report(LotStatus::Open, t0())];
        let next = run(&prior, &signals, t0());

        assert_eq!(next.status, LotStatus::Open);
        assert!(next.pending.is_none());
        assert_eq!(next.updated_at, prior.updated_at);
    }

    #[test]
    fn other_lots_and_stale_signals_do_not_vote() {
        let signals = vec![
            Signal::new("lot_63", LotStatus::Full, SignalSource::Post, t0()),
            report(LotStatus::Full, t0() - Duration::minutes(181)),
        ];
        let next = run(&initial(), &signals, t0());

        assert_eq!(next.confidence, 0.25);
        assert!(next.pending.is_none());
    }

    #[test]
    fn fresher_reports_outvote_older_ones() {
        let now = t0() + Duration::minutes(30);
        let signals = vec![
            report(LotStatus::Open, t0()),
            report(LotStatus::Open, t0()),
            report(LotStatus::Full, now),
        ];
        let next = run(&initial(), &signals, now);

        // Two half-hour-old votes weigh 2/e^2, about 0.27, against 1.0.
        assert_eq!(next.pending.map(|p| p.status), Some(LotStatus::Full));
        let expected_margin = 1.0 - 2.0 * (-2.0f64).exp();
        assert!((next.margin - expected_margin).abs() < 1e-9);
    }

    #[test]
    fn recompute_is_idempotent_for_same_inputs() {
        let signals = vec![report(LotStatus::Filling, t0())];
        let prior = initial();
        let a = run(&prior, &signals, t0());
        let b = run(&prior, &signals, t0());
        assert_eq!(a, b);
    }

    #[test]
    fn status_never_expires_on_its_own() {
        let signals = vec![report(LotStatus::Full, t0())];
        let first = run(&initial(), &signals, t0());
        let committed = run(&first, &signals, t0() + Duration::seconds(30));
        assert_eq!(committed.status, LotStatus::Full);

        let much_later = t0() + Duration::minutes(190);
        let aged = run(&committed, &signals, much_later);
        assert_eq!(aged.status, LotStatus::Full);
        assert_eq!(aged.confidence, 0.25);
        assert_eq!(aged.updated_at, t0() + Duration::seconds(30));
        assert!(aged.pending.is_none());
    }

    fn revise(current: &LotConsensus, fallback: &LotConsensus, signals: &[Signal], now: DateTime<Utc>) -> LotConsensus {
        revise_consensus_for_lot(LOT, current, fallback, signals, now, &ConsensusConfig::default())
    }

    #[test]
    fn revise_never_commits_a_pending_leader() {
        let signals = vec![report(LotStatus::Full, t0())];
        let first = run(&initial(), &signals, t0());
        let later = t0() + Duration::seconds(30);

        let revised = revise(&first, &initial(), &signals, later);
        assert_eq!(revised.status, LotStatus::Open);
        assert_eq!(revised.pending, first.pending);
        assert!(revised.confidence > 0.9);
    }

    #[test]
    fn revise_drops_pending_that_lost_the_lead() {
        let signals = vec![report(LotStatus::Full, t0())];
        let first = run(&initial(), &signals, t0());

        let revised = revise(&first, &initial(), &[], t0());
        assert_eq!(revised.status, LotStatus::Open);
        assert!(revised.pending.is_none());
        assert_eq!(revised.confidence, 0.25);
        assert_eq!(revised.updated_at, first.updated_at);
    }

    #[test]
    fn revise_keeps_a_status_the_window_still_backs() {
        let later = t0() + Duration::seconds(30);
        let signals = vec![report(LotStatus::Full, t0()), report(LotStatus::Full, t0())];
        let committed = run(&run(&initial(), &signals, t0()), &signals, later);
        assert_eq!(committed.status, LotStatus::Full);

        let revised = revise(&committed, &initial(), &signals[..1], later);
        assert_eq!(revised.status, LotStatus::Full);
        assert_eq!(revised.updated_at, later);
        assert!(revised.confidence > 0.9);
    }

    #[test]
    fn revise_falls_back_when_nothing_backs_the_status() {
        let later = t0() + Duration::seconds(30);
        let signals = vec![report(LotStatus::Full, t0())];
        let committed = run(&run(&initial(), &signals, t0()), &signals, later);
        assert_eq!(committed.status, LotStatus::Full);

        let revised = revise(&committed, &initial(), &[], later);
        assert_eq!(revised.status, LotStatus::Open);
        assert_eq!(revised.updated_at, t0());
        assert!(revised.pending.is_none());
        assert_eq!(revised.confidence, 0.25);
    }
}
