use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::kv::KeyValueStore;

const ENABLE_LOGS: bool = true;

use crate::log_debug;

pub const COOLDOWN_PREFIX: &str = "spark:cooldown:";

/// Next-allowed report times, one key per lot in device-local storage.
#[derive(Clone)]
pub struct CooldownTracker {
    store: Arc<dyn KeyValueStore>,
    duration: Duration,
}

impl CooldownTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, duration: Duration) -> Self {
        Self { store, duration }
    }

    pub fn key(lot_id: &str) -> String {
        format!("{COOLDOWN_PREFIX}{lot_id}")
    }

    /// Time left before this device may report on `lot_id` again, or `None`
    /// when it is free to report. Garbage in storage counts as no cooldown.
    pub async fn remaining(&self, lot_id: &str, now: DateTime<Utc>) -> Result<Option<Duration>> {
        let raw = self
            .store
            .get(&Self::key(lot_id))
            .await
            .with_context(|| format!("failed to read cooldown for {lot_id}"))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let expires_at = match raw.trim().parse::<i64>() {
            Ok(ms) => match Utc.timestamp_millis_opt(ms).single() {
                Some(at) => at,
                None => return Ok(None),
            },
            Err(_) => {
                log_debug!("ignoring malformed cooldown value {raw:?} for lot {lot_id}");
                return Ok(None);
            }
        };

        if expires_at > now {
            Ok(Some(expires_at - now))
        } else {
            Ok(None)
        }
    }

    /// Arm the cooldown from `now`. Returns the next allowed time.
    pub async fn start(&self, lot_id: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let next_allowed = now + self.duration;
        self.store
            .set(&Self::key(lot_id), &next_allowed.timestamp_millis().to_string())
            .await
            .with_context(|| format!("failed to store cooldown for {lot_id}"))?;
        Ok(next_allowed)
    }
}
