use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tokio::time::Duration;

use crate::detection::controller::{DEFAULT_CYCLE_TIMEOUT_SECS, DEFAULT_INTERVAL_SECS};
use crate::detection::photos::DEFAULT_PHOTO_HISTORY_CAP;
use crate::training::runner::DEFAULT_STEP_DELAY_MS;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub neural_analysis: bool,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            timeout_secs: DEFAULT_CYCLE_TIMEOUT_SECS,
            neural_analysis: true,
        }
    }
}

impl DetectionSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingSettings {
    pub step_delay_ms: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
        }
    }
}

impl TrainingSettings {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub photo_history_cap: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            photo_history_cap: DEFAULT_PHOTO_HISTORY_CAP,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
struct UserSettings {
    detection: DetectionSettings,
    training: TrainingSettings,
    storage: StorageSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unparseable settings in {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn detection(&self) -> DetectionSettings {
        self.read().detection.clone()
    }

    pub fn training(&self) -> TrainingSettings {
        self.read().training.clone()
    }

    pub fn storage(&self) -> StorageSettings {
        self.read().storage.clone()
    }

    pub fn update_detection(&self, settings: DetectionSettings) -> Result<()> {
        let mut guard = self.write();
        guard.detection = settings;
        self.persist(&guard)
    }

    pub fn update_training(&self, settings: TrainingSettings) -> Result<()> {
        let mut guard = self.write();
        guard.training = settings;
        self.persist(&guard)
    }

    pub fn update_storage(&self, settings: StorageSettings) -> Result<()> {
        let mut guard = self.write();
        guard.storage = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
