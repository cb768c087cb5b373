use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    helpers::{parse_optional_datetime, to_i64},
    Database,
};
use crate::models::Lot;

fn row_to_lot(row: &Row) -> Result<Lot, rusqlite::Error> {
    Ok(Lot {
        id: row.get("id")?,
        name: row.get("name")?,
        lat: row.get("lat")?,
        lng: row.get("lng")?,
    })
}

impl Database {
    /// Replace the cached catalog wholesale, preserving order.
    pub async fn replace_cached_lots(&self, lots: &[Lot]) -> Result<()> {
        let lots = lots.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM cached_lots", [])?;
            let cached_at = Utc::now().to_rfc3339();
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO cached_lots (id, name, lat, lng, position, cached_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for (position, lot) in lots.iter().enumerate() {
                    stmt.execute(params![
                        lot.id,
                        lot.name,
                        lot.lat,
                        lot.lng,
                        to_i64(position)?,
                        cached_at,
                    ])?;
                }
            }
            tx.commit().context("failed to commit lot cache")?;
            Ok(())
        })
        .await
    }

    pub async fn cached_lots(&self) -> Result<Vec<Lot>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, lat, lng FROM cached_lots ORDER BY position ASC",
            )?;
            let lots = stmt
                .query_map([], row_to_lot)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(lots)
        })
        .await
    }

    /// When the cache was last written, if ever.
    pub async fn lots_cached_at(&self) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .execute(|conn| {
                let value = conn.query_row("SELECT MAX(cached_at) FROM cached_lots", [], |row| {
                    row.get::<_, Option<String>>(0)
                })?;
                Ok(value)
            })
            .await?;
        parse_optional_datetime(raw, "cached_at")
    }
}
