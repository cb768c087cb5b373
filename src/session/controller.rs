use std::{
    collections::HashSet,
    sync::{Arc, PoisonError},
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time,
};

use crate::catalog::LotCatalog;
use crate::consensus::{ConsensusConfig, ConsensusStore, LotView, StatusTransition};
use crate::gate::{FailurePolicy, PendingSubmission, ReportError, ReportGate};
use crate::geo::{cell_center, cell_id, GeoPoint};
use crate::models::{LotConsensus, LotStatus, Signal, SignalSource};
use crate::remote::{LotReader, PaceReport, RemoteReport, ReportRecord, ReportSink};
use crate::signals::SignalStore;

use super::SessionConfig;

const ENABLE_LOGS: bool = true;
const EVENT_CAPACITY: usize = 64;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone)]
pub enum SessionEvent {
    ConsensusUpdated {
        at: DateTime<Utc>,
        transitions: Vec<StatusTransition>,
    },
    ReportAccepted {
        lot_id: String,
        signal_id: String,
    },
    ReportRolledBack {
        lot_id: String,
        signal_id: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub signal_id: String,
    pub lot_id: String,
    pub status: LotStatus,
    /// False when the remote insert failed and the signal was retained anyway.
    pub persisted: bool,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub transition: Option<StatusTransition>,
}

/// A stored PACE sighting, reported at grid-cell precision.
#[derive(Debug, Clone, PartialEq)]
pub struct PaceSighting {
    pub cell_id: String,
    pub center: GeoPoint,
    pub reported_at: DateTime<Utc>,
}

/// Signal window and consensus table share one lock so a submission and a
/// tick never observe each other half-applied.
struct EngineState {
    signals: SignalStore,
    consensus: ConsensusStore,
    last_pass: Option<DateTime<Utc>>,
}

impl EngineState {
    /// Compensation runs after an await, so it is evaluated no earlier than
    /// the latest pass that ran meanwhile.
    fn settle_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.last_pass.map_or(now, |last| last.max(now))
    }

    fn run_pass(&mut self, now: DateTime<Utc>) -> Vec<StatusTransition> {
        self.last_pass = Some(now);
        let max_age = self.consensus.config().max_signal_age_minutes;
        let pruned = self.signals.prune(now, max_age);
        if pruned > 0 {
            log_debug!("pruned {pruned} expired signals");
        }
        self.consensus.recompute_all(&self.signals, now)
    }
}

/// Removes the lot from the in-flight set when the submission finishes,
/// whichever path it takes.
struct InFlightGuard {
    set: Arc<std::sync::Mutex<HashSet<String>>>,
    lot_id: String,
}

impl InFlightGuard {
    fn acquire(set: &Arc<std::sync::Mutex<HashSet<String>>>, lot_id: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(lot_id.to_string());
        inserted.then(|| Self {
            set: set.clone(),
            lot_id: lot_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.lot_id);
    }
}

#[derive(Clone)]
pub struct ParkingSession {
    catalog: Arc<LotCatalog>,
    state: Arc<Mutex<EngineState>>,
    gate: Arc<ReportGate>,
    sink: Arc<dyn ReportSink>,
    device_id: Option<String>,
    in_flight: Arc<std::sync::Mutex<HashSet<String>>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
    events: broadcast::Sender<SessionEvent>,
}

impl ParkingSession {
    pub fn new(
        catalog: LotCatalog,
        consensus_config: ConsensusConfig,
        session_config: &SessionConfig,
        gate: ReportGate,
        sink: Arc<dyn ReportSink>,
        device_id: Option<String>,
    ) -> Self {
        let debug_mode = std::env::var("SPARK_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let consensus = ConsensusStore::new(catalog.ids(), consensus_config, Utc::now());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            catalog: Arc::new(catalog),
            state: Arc::new(Mutex::new(EngineState {
                signals: SignalStore::new(),
                consensus,
                last_pass: None,
            })),
            gate: Arc::new(gate),
            sink,
            device_id,
            in_flight: Arc::new(std::sync::Mutex::new(HashSet::new())),
            ticker: Arc::new(Mutex::new(None)),
            tick_interval: if debug_mode {
                Duration::from_secs(1)
            } else {
                session_config.tick_interval()
            },
            events,
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn catalog(&self) -> &LotCatalog {
        &self.catalog
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn consensus(&self, lot_id: &str) -> Option<LotConsensus> {
        self.state.lock().await.consensus.get(lot_id).cloned()
    }

    pub async fn signal_count(&self) -> usize {
        self.state.lock().await.signals.len()
    }

    /// Display projection of every catalog lot, in catalog order.
    pub async fn views(&self, now: DateTime<Utc>) -> Vec<LotView> {
        let state = self.state.lock().await;
        self.catalog
            .lots()
            .iter()
            .filter_map(|lot| {
                state
                    .consensus
                    .get(&lot.id)
                    .map(|consensus| LotView::new(lot, consensus, now))
            })
            .collect()
    }

    pub fn is_submitting(&self, lot_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(lot_id)
    }

    /// Prune the window and recompute every lot.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<StatusTransition> {
        let transitions = self.state.lock().await.run_pass(now);
        log_debug!(
            "recomputed {} lots, {} transitions",
            self.catalog.len(),
            transitions.len()
        );
        for transition in &transitions {
            log_info!(
                "lot {} is now {} (was {})",
                transition.lot_id,
                transition.to.as_str(),
                transition.from.as_str()
            );
        }
        let _ = self.events.send(SessionEvent::ConsensusUpdated {
            at: now,
            transitions: transitions.clone(),
        });
        transitions
    }

    pub async fn start(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let session = self.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            loop {
                interval.tick().await;
                session.tick(Utc::now()).await;
            }
        });

        *ticker_guard = Some(handle);
        log_info!(
            "consensus ticker started for {} lots every {:?}",
            self.catalog.len(),
            tick_interval
        );
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
            log_info!("consensus ticker stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.ticker.lock().await.is_some()
    }

    /// Seed the window with reports the backend already holds.
    pub async fn hydrate(&self, reader: &dyn LotReader, now: DateTime<Utc>) -> Result<usize> {
        let max_age = self.state.lock().await.consensus.config().max_signal_age_minutes;
        let since = now - chrono::Duration::milliseconds((max_age * 60_000.0) as i64);
        let reports = reader
            .fetch_reports_since(since)
            .await
            .context("failed to fetch recent reports")?;
        Ok(self.ingest_reports(reports, now).await)
    }

    /// Append remote reports for known lots and run one pass.
    pub async fn ingest_reports(&self, reports: Vec<RemoteReport>, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock().await;
        let mut ingested = 0;
        for report in reports {
            let Some(signal) = report.into_signal() else {
                continue;
            };
            if !self.catalog.contains(&signal.lot_id) {
                log_debug!("skipping report for unknown lot {}", signal.lot_id);
                continue;
            }
            state.signals.append(signal);
            ingested += 1;
        }
        let transitions = state.run_pass(now);
        drop(state);

        log_info!("hydrated {ingested} recent reports");
        let _ = self.events.send(SessionEvent::ConsensusUpdated {
            at: now,
            transitions,
        });
        ingested
    }

    pub async fn submit_report(
        &self,
        lot_id: &str,
        status: LotStatus,
        source: SignalSource,
    ) -> Result<SubmissionReceipt, ReportError> {
        self.submit_report_at(lot_id, status, source, Utc::now()).await
    }

    /// Validate, accept optimistically, persist, then keep or compensate.
    pub async fn submit_report_at(
        &self,
        lot_id: &str,
        status: LotStatus,
        source: SignalSource,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReceipt, ReportError> {
        let lot = self
            .catalog
            .get(lot_id)
            .ok_or_else(|| ReportError::UnknownLot(lot_id.to_string()))?;

        let _in_flight = InFlightGuard::acquire(&self.in_flight, lot_id)
            .ok_or_else(|| ReportError::AlreadySubmitting(lot_id.to_string()))?;

        let fix = match self.gate.validate(lot, now).await {
            Ok(fix) => fix,
            Err(err) => {
                if err.is_validation() {
                    log_info!("report for {lot_id} rejected: {err}");
                } else {
                    log_warn!("report for {lot_id} could not be checked: {err}");
                }
                return Err(err);
            }
        };
        log_debug!("report for {lot_id} passed checks at {:.0} m", fix.distance_m);

        let mut submission = PendingSubmission::new(Signal::new(lot_id, status, source, now));
        let transition = {
            let mut state = self.state.lock().await;
            let EngineState {
                signals, consensus, ..
            } = &mut *state;
            submission.accept(signals, consensus, now)
        };
        let signal_id = submission.signal().id.clone();

        let _ = self.events.send(SessionEvent::ReportAccepted {
            lot_id: lot_id.to_string(),
            signal_id: signal_id.clone(),
        });
        let _ = self.events.send(SessionEvent::ConsensusUpdated {
            at: now,
            transitions: transition.iter().cloned().collect(),
        });

        let record = ReportRecord::from_signal(submission.signal(), self.device_id.clone());
        let persisted = match self.sink.insert_report(&record).await {
            Ok(()) => true,
            Err(err) => match self.gate.config().failure_policy {
                FailurePolicy::RollBack => {
                    let (at, reverted) = {
                        let mut state = self.state.lock().await;
                        let at = state.settle_time(now);
                        let EngineState {
                            signals, consensus, ..
                        } = &mut *state;
                        (at, submission.rollback(signals, consensus, at))
                    };
                    let reason = format!("{err:#}");
                    log_warn!("rolled back report {signal_id} for {lot_id}: {reason}");
                    if let Some(transition) = &reverted {
                        log_info!(
                            "lot {} is now {} (was {})",
                            transition.lot_id,
                            transition.to.as_str(),
                            transition.from.as_str()
                        );
                    }
                    let _ = self.events.send(SessionEvent::ReportRolledBack {
                        lot_id: lot_id.to_string(),
                        signal_id,
                        reason: reason.clone(),
                    });
                    let _ = self.events.send(SessionEvent::ConsensusUpdated {
                        at,
                        transitions: reverted.into_iter().collect(),
                    });
                    return Err(ReportError::PersistenceFailure(reason));
                }
                FailurePolicy::Retain => {
                    log_warn!("remote insert failed for {lot_id}, keeping report locally: {err:#}");
                    false
                }
            },
        };
        submission.commit();

        let cooldown_until = match self.gate.record_accepted(lot_id, now).await {
            Ok(until) => Some(until),
            Err(err) => {
                log_warn!("failed to arm cooldown for {lot_id}: {err}");
                None
            }
        };

        Ok(SubmissionReceipt {
            signal_id,
            lot_id: lot_id.to_string(),
            status,
            persisted,
            cooldown_until,
            transition,
        })
    }

    pub async fn report_pace_sighting(&self) -> Result<PaceSighting, ReportError> {
        self.report_pace_sighting_at(Utc::now()).await
    }

    /// Flag a PACE sighting in the device's grid cell. Needs a location fix
    /// but no cooldown or geofence, and leaves the signal window alone.
    pub async fn report_pace_sighting_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<PaceSighting, ReportError> {
        let position = self.gate.locate().await?;
        let cell_id = cell_id(position);

        let report = PaceReport {
            cell_id: cell_id.clone(),
        };
        if let Err(err) = self.sink.insert_pace_report(&report).await {
            let reason = format!("{err:#}");
            log_warn!("PACE sighting in cell {cell_id} was not stored: {reason}");
            return Err(ReportError::PersistenceFailure(reason));
        }
        log_info!("PACE sighting reported in cell {cell_id}");

        Ok(PaceSighting {
            center: cell_center(&cell_id).unwrap_or(position),
            cell_id,
            reported_at: now,
        })
    }
}
