//! Contracts with the hosted backend. The engine never depends on the
//! backend's own aggregation; server statuses are displayed separately.

pub mod postgrest;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Lot, LotStatus, Signal, SignalSource};

pub use postgrest::{PostgrestClient, PostgrestConfig};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Row written for every accepted report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub lot_id: String,
    pub status: LotStatus,
    pub source: SignalSource,
    pub recorded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl ReportRecord {
    pub fn from_signal(signal: &Signal, device_id: Option<String>) -> Self {
        Self {
            lot_id: signal.lot_id.clone(),
            status: signal.status,
            source: signal.source,
            recorded_at: signal.created_at,
            device_id,
        }
    }
}

/// Anonymous sighting of the campus parking patrol, keyed by grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaceReport {
    pub cell_id: String,
}

/// A report row read back from the backend. Status and source are kept as
/// raw strings; unknown values are filtered when converting to a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteReport {
    pub lot_id: String,
    pub status: String,
    #[serde(default)]
    pub source: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl RemoteReport {
    pub fn into_signal(self) -> Option<Signal> {
        let Some(status) = LotStatus::parse(&self.status) else {
            log_debug!(
                "dropping remote report for {} with unknown status {:?}",
                self.lot_id,
                self.status
            );
            return None;
        };
        let source = self
            .source
            .as_deref()
            .map(SignalSource::parse)
            .unwrap_or(SignalSource::Post);
        Some(Signal::new(self.lot_id, status, source, self.recorded_at))
    }
}

/// Server-side current status for one lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLotStatus {
    pub lot_id: String,
    pub status: Option<LotStatus>,
    pub confidence: Option<f64>,
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn insert_report(&self, record: &ReportRecord) -> Result<()>;
    async fn insert_pace_report(&self, report: &PaceReport) -> Result<()>;
}

#[async_trait]
pub trait LotReader: Send + Sync {
    async fn fetch_lots(&self) -> Result<Vec<Lot>>;
    async fn fetch_statuses(&self) -> Result<Vec<RemoteLotStatus>>;
    async fn fetch_reports_since(&self, since: DateTime<Utc>) -> Result<Vec<RemoteReport>>;
}

/// Sink used when no backend is configured: reports stay local.
#[derive(Debug, Default, Clone)]
pub struct LoggingSink;

#[async_trait]
impl ReportSink for LoggingSink {
    async fn insert_report(&self, record: &ReportRecord) -> Result<()> {
        log_info!(
            "no remote configured; keeping {} report for {} local",
            record.status.as_str(),
            record.lot_id
        );
        Ok(())
    }

    async fn insert_pace_report(&self, report: &PaceReport) -> Result<()> {
        log_info!(
            "no remote configured; keeping PACE sighting in cell {} local",
            report.cell_id
        );
        Ok(())
    }
}
