use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use crate::consensus::ConsensusConfig;
use crate::gate::GateConfig;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SparkSettings {
    pub consensus: ConsensusConfig,
    pub gate: GateConfig,
    pub session: SessionConfig,
}

impl SparkSettings {
    /// Settings with unusable numeric values replaced by defaults.
    pub fn sanitized(self) -> Self {
        Self {
            consensus: self.consensus.sanitized(),
            ..self
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<SparkSettings>,
}

impl SettingsStore {
    /// Loads `path`, or starts from defaults when the file is missing or unreadable JSON.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str::<SparkSettings>(&contents)
                .unwrap_or_default()
                .sanitized()
        } else {
            SparkSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> SparkSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, settings: SparkSettings) -> Result<()> {
        let settings = settings.sanitized();
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    /// Writes the current values out, so a fresh install gets an editable file.
    pub fn save(&self) -> Result<()> {
        let guard = self.data.read().unwrap_or_else(PoisonError::into_inner);
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: SparkSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", self.path.display()))?;
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = data.sanitized();
        Ok(())
    }

    fn persist(&self, data: &SparkSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
