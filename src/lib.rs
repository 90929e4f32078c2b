pub mod db;
pub mod detection;
pub mod export;
pub mod settings;
pub mod training;
pub mod utils;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use db::Database;
use detection::{BaseDetector, DetectionController, DetectionPipeline, PhotoHistory, Scorer};
use settings::SettingsStore;
use training::{TrainingFolderStore, TrainingImageRepository, TrainingRunner, TrainingSessionLedger};

pub use utils::logging::init_logging;

pub const DATABASE_FILE: &str = "ppe_vision.sqlite3";
pub const SETTINGS_FILE: &str = "settings.json";

/// Every component, wired to one database and one settings file.
pub struct PpeVision {
    pub db: Database,
    pub settings: SettingsStore,
    pub folders: TrainingFolderStore,
    pub repository: TrainingImageRepository,
    pub ledger: TrainingSessionLedger,
    pub photos: PhotoHistory,
}

impl PpeVision {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::new(data_dir.join(DATABASE_FILE))?;
        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;
        let photo_cap = settings.storage().photo_history_cap;

        Ok(Self {
            folders: TrainingFolderStore::new(db.clone()),
            repository: TrainingImageRepository::new(db.clone()),
            ledger: TrainingSessionLedger::new(db.clone()),
            photos: PhotoHistory::with_cap(db.clone(), photo_cap),
            settings,
            db,
        })
    }

    pub fn training_runner(&self, scorer: Arc<dyn Scorer>) -> TrainingRunner {
        TrainingRunner::new(self.db.clone(), scorer, self.settings.training().step_delay())
    }

    pub fn detection_pipeline(
        &self,
        detector: Arc<dyn BaseDetector>,
        scorer: Arc<dyn Scorer>,
    ) -> DetectionPipeline {
        DetectionPipeline::new(
            detector,
            scorer,
            self.repository.clone(),
            self.ledger.clone(),
            self.photos.clone(),
        )
        .with_neural_analysis(self.settings.detection().neural_analysis)
    }

    pub fn detection_controller(&self) -> DetectionController {
        let detection = self.settings.detection();
        DetectionController::new(detection.interval(), detection.timeout())
    }

    /// Removes folders, sessions, the model and the photo history.
    pub async fn clear_all(&self) -> Result<()> {
        self.folders.clear().await?;
        self.ledger.clear().await?;
        self.photos.clear().await?;
        log::info!("All training and detection data cleared");
        Ok(())
    }
}
