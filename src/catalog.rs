//! Lot catalog: the static reference set of lots the app knows about.

use std::collections::HashMap;

use crate::db::Database;
use crate::models::Lot;
use crate::remote::LotReader;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Upper bound on search hits returned to the search bar.
pub const MAX_SEARCH_RESULTS: usize = 6;

/// Built-in campus catalog, used when neither the remote table nor the local
/// cache can supply one.
const BUILTIN_LOTS: &[(&str, &str, f64, f64)] = &[
    // Parking ramps
    ("ramp_1", "Ramp 1 / Wharton Center", 42.7247, -84.4883),
    ("ramp_3", "Ramp 3 / Shaw Hall", 42.7262, -84.4777),
    ("ramp_5", "Ramp 5 / Comm Arts", 42.7214, -84.4678),
    ("ramp_6", "Ramp 6 / Grand River Ave", 42.7368, -84.4828),
    // Stadium and arena
    ("lot_79", "Lot 79 / Spartan Stadium", 42.7260, -84.4870),
    ("lot_63", "Lot 63 / Breslin Center", 42.7280, -84.4920),
    ("lot_124", "Lot 124 / Munn Arena", 42.7272, -84.4905),
    // North campus
    ("lot_39", "Lot 39 / MSU Union", 42.7347, -84.4802),
    ("lot_62", "Lot 62 / IM Sports West", 42.7311, -84.4862),
    ("lot_15", "Lot 15 / International Center", 42.7275, -84.4788),
    // South campus
    ("lot_89", "Lot 89 / Wilson & Case Halls", 42.7190, -84.4830),
    ("lot_83", "Lot 83 / Business College", 42.7230, -84.4810),
    // Commuter and perimeter
    ("lot_91", "Lot 91 / Commuter Lot (Service Rd)", 42.7160, -84.4780),
    ("lot_80", "Lot 80 / Vet Med", 42.7120, -84.4690),
];

#[derive(Debug, Clone, Default)]
pub struct LotCatalog {
    lots: Vec<Lot>,
    by_id: HashMap<String, usize>,
}

impl LotCatalog {
    /// Later duplicates of an id are dropped so lookups stay unambiguous.
    pub fn new(lots: Vec<Lot>) -> Self {
        let mut unique = Vec::with_capacity(lots.len());
        let mut by_id = HashMap::with_capacity(lots.len());
        for lot in lots {
            if by_id.contains_key(&lot.id) {
                continue;
            }
            by_id.insert(lot.id.clone(), unique.len());
            unique.push(lot);
        }
        Self { lots: unique, by_id }
    }

    pub fn builtin() -> Self {
        Self::new(
            BUILTIN_LOTS
                .iter()
                .map(|(id, name, lat, lng)| Lot::new(*id, *name, *lat, *lng))
                .collect(),
        )
    }

    pub fn get(&self, lot_id: &str) -> Option<&Lot> {
        self.by_id.get(lot_id).map(|&idx| &self.lots[idx])
    }

    pub fn contains(&self, lot_id: &str) -> bool {
        self.by_id.contains_key(lot_id)
    }

    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.lots.iter().map(|lot| lot.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    /// Case-insensitive substring match over name and id, catalog order,
    /// capped at [`MAX_SEARCH_RESULTS`]. A blank query matches nothing.
    pub fn search(&self, query: &str) -> Vec<&Lot> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        self.lots
            .iter()
            .filter(|lot| {
                lot.name.to_lowercase().contains(&needle) || lot.id.to_lowercase().contains(&needle)
            })
            .take(MAX_SEARCH_RESULTS)
            .collect()
    }
}

/// Startup catalog: the remote table when reachable (refreshing the local
/// cache), else the cache, else the built-in list.
pub async fn load_catalog(db: &Database, reader: Option<&dyn LotReader>) -> LotCatalog {
    if let Some(reader) = reader {
        match reader.fetch_lots().await {
            Ok(lots) if !lots.is_empty() => {
                if let Err(err) = db.replace_cached_lots(&lots).await {
                    log_warn!("failed to refresh lot cache: {err:#}");
                }
                log_info!("loaded {} lots from remote", lots.len());
                return LotCatalog::new(lots);
            }
            Ok(_) => log_warn!("remote returned no lots"),
            Err(err) => log_warn!("failed to fetch lots from remote: {err:#}"),
        }
    }

    match db.cached_lots().await {
        Ok(lots) if !lots.is_empty() => {
            let cached_at = db.lots_cached_at().await.ok().flatten();
            log_info!(
                "loaded {} lots from local cache (written {:?})",
                lots.len(),
                cached_at
            );
            return LotCatalog::new(lots);
        }
        Ok(_) => {}
        Err(err) => log_warn!("failed to read lot cache: {err:#}"),
    }

    log_info!("using built-in lot catalog");
    LotCatalog::builtin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_indexed() {
        let catalog = LotCatalog::builtin();
        assert_eq!(catalog.len(), 14);
        assert_eq!(catalog.get("lot_79").map(|l| l.name.as_str()), Some("Lot 79 / Spartan Stadium"));
        assert!(catalog.get("lot_999").is_none());
    }

    #[test]
    fn duplicate_ids_keep_first_entry() {
        let catalog = LotCatalog::new(vec![
            Lot::new("a", "First", 0.0, 0.0),
            Lot::new("a", "Second", 1.0, 1.0),
        ]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("a").map(|l| l.name.as_str()), Some("First"));
    }

    #[test]
    fn search_matches_name_and_id_case_insensitively() {
        let catalog = LotCatalog::builtin();

        let hits = catalog.search("breslin");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "lot_63");

        let hits = catalog.search("RAMP_5");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "ramp_5");
    }

    #[test]
    fn search_is_capped_and_blank_matches_nothing() {
        let catalog = LotCatalog::builtin();
        assert_eq!(catalog.search("lot").len(), MAX_SEARCH_RESULTS);
        assert!(catalog.search("   ").is_empty());
        assert!(catalog.search("no such lot").is_empty());
    }

    struct StubReader {
        lots: anyhow::Result<Vec<Lot>>,
    }

    #[async_trait::async_trait]
    impl LotReader for StubReader {
        async fn fetch_lots(&self) -> anyhow::Result<Vec<Lot>> {
            match &self.lots {
                Ok(lots) => Ok(lots.clone()),
                Err(err) => Err(anyhow::anyhow!("{err}")),
            }
        }

        async fn fetch_statuses(&self) -> anyhow::Result<Vec<crate::remote::RemoteLotStatus>> {
            Ok(Vec::new())
        }

        async fn fetch_reports_since(
            &self,
            _since: chrono::DateTime<chrono::Utc>,
        ) -> anyhow::Result<Vec<crate::remote::RemoteReport>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn catalog_falls_back_remote_cache_builtin() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Database::new(dir.path().join("spark.sqlite3"))?;

        let catalog = load_catalog(&db, None).await;
        assert_eq!(catalog.len(), LotCatalog::builtin().len());

        let remote = StubReader {
            lots: Ok(vec![
                Lot::new("north", "North Lot", 42.73, -84.48),
                Lot::new("south", "South Lot", 42.72, -84.48),
            ]),
        };
        let catalog = load_catalog(&db, Some(&remote)).await;
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["north", "south"]);

        let offline = StubReader {
            lots: Err(anyhow::anyhow!("offline")),
        };
        let catalog = load_catalog(&db, Some(&offline)).await;
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["north", "south"]);
        Ok(())
    }
}
