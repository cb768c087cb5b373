//! REST client for a PostgREST (Supabase-style) backend.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use super::{LotReader, PaceReport, RemoteLotStatus, RemoteReport, ReportRecord, ReportSink};
use crate::models::{Lot, LotStatus};

const REPORTS_TABLE: &str = "parking_signals";
const PACE_TABLE: &str = "pace_reports";
const LOTS_QUERY: &str = "id,name,lat,lng,lot_current(status,confidence)";
const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    pub base_url: String,
    pub anon_key: String,
}

impl PostgrestConfig {
    /// Reads `SPARK_SUPABASE_URL` and `SPARK_SUPABASE_ANON_KEY`; `None` when
    /// either is missing or blank.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SPARK_SUPABASE_URL").ok()?;
        let anon_key = std::env::var("SPARK_SUPABASE_ANON_KEY").ok()?;
        if base_url.trim().is_empty() || anon_key.trim().is_empty() {
            return None;
        }
        Some(Self { base_url, anon_key })
    }
}

pub struct PostgrestClient {
    client: Client,
    config: PostgrestConfig,
}

/// Lot ids are text in the catalog but integers in older tables.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLotId {
    Text(String),
    Number(i64),
}

impl RawLotId {
    fn into_string(self) -> String {
        match self {
            RawLotId::Text(s) => s,
            RawLotId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawLotCurrent {
    status: Option<String>,
    confidence: Option<f64>,
}

/// PostgREST embeds a one-to-one relation as an object or a one-element array
/// depending on how the foreign key is declared.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLotCurrentField {
    One(RawLotCurrent),
    Many(Vec<RawLotCurrent>),
}

#[derive(Debug, Deserialize)]
struct RawLotRow {
    id: RawLotId,
    name: String,
    lat: f64,
    lng: f64,
    #[serde(default)]
    lot_current: Option<RawLotCurrentField>,
}

impl RawLotRow {
    fn current(&mut self) -> Option<RawLotCurrent> {
        match self.lot_current.take()? {
            RawLotCurrentField::One(current) => Some(current),
            RawLotCurrentField::Many(list) => list.into_iter().next(),
        }
    }
}

fn parse_lot_rows(rows: Vec<RawLotRow>) -> Vec<(Lot, RemoteLotStatus)> {
    rows.into_iter()
        .map(|mut row| {
            let current = row.current();
            let id = row.id.into_string();
            let status = RemoteLotStatus {
                lot_id: id.clone(),
                status: current
                    .as_ref()
                    .and_then(|c| c.status.as_deref())
                    .and_then(LotStatus::parse),
                confidence: current.and_then(|c| c.confidence),
            };
            (Lot::new(id, row.name, row.lat, row.lng), status)
        })
        .collect()
}

impl PostgrestClient {
    pub fn new(config: PostgrestConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            table
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
    }

    async fn fetch_lot_rows(&self) -> Result<Vec<(Lot, RemoteLotStatus)>> {
        let response = self
            .authorized(self.client.get(self.table_url("lots")))
            .query(&[("select", LOTS_QUERY), ("order", "name.asc")])
            .send()
            .await
            .context("lots request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("lots request returned {status}"));
        }

        let rows: Vec<RawLotRow> = response
            .json()
            .await
            .context("failed to decode lots response")?;
        Ok(parse_lot_rows(rows))
    }
}

#[async_trait]
impl ReportSink for PostgrestClient {
    async fn insert_report(&self, record: &ReportRecord) -> Result<()> {
        self.insert_row(REPORTS_TABLE, record).await
    }

    async fn insert_pace_report(&self, report: &PaceReport) -> Result<()> {
        self.insert_row(PACE_TABLE, report).await
    }
}

impl PostgrestClient {
    async fn insert_row<T: Serialize + Sync>(&self, table: &str, row: &T) -> Result<()> {
        let response = self
            .authorized(self.client.post(self.table_url(table)))
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await
            .with_context(|| format!("{table} insert request failed"))?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("{table} insert returned {status}: {body}"))
            }
        }
    }
}

#[async_trait]
impl LotReader for PostgrestClient {
    async fn fetch_lots(&self) -> Result<Vec<Lot>> {
        Ok(self
            .fetch_lot_rows()
            .await?
            .into_iter()
            .map(|(lot, _)| lot)
            .collect())
    }

    async fn fetch_statuses(&self) -> Result<Vec<RemoteLotStatus>> {
        Ok(self
            .fetch_lot_rows()
            .await?
            .into_iter()
            .map(|(_, status)| status)
            .collect())
    }

    async fn fetch_reports_since(&self, since: DateTime<Utc>) -> Result<Vec<RemoteReport>> {
        let filter = format!(
            "gte.{}",
            since.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        let response = self
            .authorized(self.client.get(self.table_url(REPORTS_TABLE)))
            .query(&[
                ("select", "lot_id,status,source,recorded_at"),
                ("recorded_at", filter.as_str()),
                ("order", "recorded_at.asc"),
            ])
            .send()
            .await
            .context("reports request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("reports request returned {status}"));
        }

        response
            .json()
            .await
            .context("failed to decode reports response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lot_rows_accept_object_array_and_missing_current() {
        let rows: Vec<RawLotRow> = serde_json::from_str(
            r#"[
                {"id": "lot_79", "name": "Lot 79", "lat": 42.726, "lng": -84.487,
                 "lot_current": {"status": "full", "confidence": 0.9}},
                {"id": 63, "name": "Lot 63", "lat": 42.728, "lng": -84.492,
                 "lot_current": [{"status": "tight", "confidence": 0.6}]},
                {"id": "ramp_1", "name": "Ramp 1", "lat": 42.7247, "lng": -84.4883,
                 "lot_current": null},
                {"id": "ramp_3", "name": "Ramp 3", "lat": 42.7262, "lng": -84.4777,
                 "lot_current": {"status": "gridlock", "confidence": null}}
            ]"#,
        )
        .unwrap();

        let parsed = parse_lot_rows(rows);
        assert_eq!(parsed.len(), 4);

        assert_eq!(parsed[0].0.id, "lot_79");
        assert_eq!(parsed[0].1.status, Some(LotStatus::Full));
        assert_eq!(parsed[0].1.confidence, Some(0.9));

        assert_eq!(parsed[1].0.id, "63");
        assert_eq!(parsed[1].1.status, Some(LotStatus::Filling));

        assert_eq!(parsed[2].1.status, None);
        assert_eq!(parsed[2].1.confidence, None);

        assert_eq!(parsed[3].1.status, None);
    }

    #[test]
    fn table_url_tolerates_trailing_slash() {
        let client = PostgrestClient::new(PostgrestConfig {
            base_url: "https://example.supabase.co/".into(),
            anon_key: "anon".into(),
        })
        .unwrap();
        assert_eq!(
            client.table_url("lots"),
            "https://example.supabase.co/rest/v1/lots"
        );
    }
}
