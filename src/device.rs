use anyhow::{Context, Result};
use uuid::Uuid;

use crate::kv::KeyValueStore;

pub const DEVICE_ID_KEY: &str = "spark:device_id";

/// Stable per-install identifier, minted on first use.
pub async fn device_id(store: &dyn KeyValueStore) -> Result<String> {
    if let Some(existing) = store
        .get(DEVICE_ID_KEY)
        .await
        .context("failed to read device id")?
    {
        if !existing.trim().is_empty() {
            return Ok(existing);
        }
    }

    let id = Uuid::new_v4().to_string();
    store
        .set(DEVICE_ID_KEY, &id)
        .await
        .context("failed to persist device id")?;
    Ok(id)
}
