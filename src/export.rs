//! JSON snapshots of the training data and the session ledger.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{Database, TrainingFolder, TrainingSession, CurrentModel};
use crate::training::{
    folders::load_folders,
    ledger::{compute_ledger_stats, load_or_init_model, load_sessions, stored_sample_count, LedgerStats},
    repository::compute_stats,
    TrainingStats,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

pub const TRAINING_IMAGES_EXPORT_VERSION: &str = "2.0";
pub const NEURAL_TRAINING_EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    TrainingImages,
    NeuralTraining,
}

impl ExportKind {
    fn file_prefix(self) -> &'static str {
        match self {
            ExportKind::TrainingImages => "training_images_data",
            ExportKind::NeuralTraining => "neural_training_data",
        }
    }

    /// `<prefix>_<yyyy-mm-dd>.json`, dated in UTC.
    pub fn file_name(self, date: DateTime<Utc>) -> String {
        format!("{}_{}.json", self.file_prefix(), date.format("%Y-%m-%d"))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingImagesExport {
    pub folders: Vec<TrainingFolder>,
    pub stats: TrainingStats,
    pub export_date: DateTime<Utc>,
    pub version: &'static str,
    /// Number of samples across all folders.
    pub total_size: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NeuralTrainingExport {
    pub sessions: Vec<TrainingSession>,
    pub model: CurrentModel,
    pub stats: LedgerStats,
    pub export_date: DateTime<Utc>,
    pub version: &'static str,
}

pub async fn export_training_images(db: &Database) -> Result<TrainingImagesExport> {
    db.execute(|conn| {
        let folders = load_folders(conn)?;
        let stats = compute_stats(&folders);
        let total_size = folders.iter().map(|folder| folder.images.len()).sum();
        Ok(TrainingImagesExport {
            folders,
            stats,
            export_date: Utc::now(),
            version: TRAINING_IMAGES_EXPORT_VERSION,
            total_size,
        })
    })
    .await
}

pub async fn export_neural_training(db: &Database) -> Result<NeuralTrainingExport> {
    db.execute(|conn| {
        let now = Utc::now();
        let sessions = load_sessions(conn)?;
        let model = load_or_init_model(conn, now)?;
        let stored = stored_sample_count(conn)?;
        let stats = compute_ledger_stats(&sessions, model.clone(), stored);
        Ok(NeuralTrainingExport {
            sessions,
            model,
            stats,
            export_date: now,
            version: NEURAL_TRAINING_EXPORT_VERSION,
        })
    })
    .await
}

/// Writes the export as pretty JSON into `dir` and returns the file path.
pub async fn write_export(db: &Database, dir: &Path, kind: ExportKind) -> Result<PathBuf> {
    let (serialized, date) = match kind {
        ExportKind::TrainingImages => {
            let export = export_training_images(db).await?;
            (serde_json::to_string_pretty(&export)?, export.export_date)
        }
        ExportKind::NeuralTraining => {
            let export = export_neural_training(db).await?;
            (serde_json::to_string_pretty(&export)?, export.export_date)
        }
    };

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;
    let path = dir.join(kind.file_name(date));
    tokio::fs::write(&path, serialized)
        .await
        .with_context(|| format!("failed to write export {}", path.display()))?;

    log_info!("export written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::PpeLabels;
    use crate::training::{ImageUpload, TrainingFolderStore, TrainingSessionLedger};
    use chrono::TimeZone;
    use serde_json::Value;

    #[test]
    fn file_names_are_dated() {
        let date = Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 0).unwrap();
        assert_eq!(
            ExportKind::TrainingImages.file_name(date),
            "training_images_data_2024-03-07.json"
        );
        assert_eq!(
            ExportKind::NeuralTraining.file_name(date),
            "neural_training_data_2024-03-07.json"
        );
    }

    #[tokio::test]
    async fn training_images_export_counts_samples() {
        let db = Database::in_memory().unwrap();
        let store = TrainingFolderStore::new(db.clone());
        store
            .save_samples(
                vec![
                    (ImageUpload::from_bytes("a.jpg", vec![1]), PpeLabels::default()),
                    (ImageUpload::from_bytes("b.jpg", vec![2]), PpeLabels::default()),
                ],
                None,
                None,
            )
            .await
            .unwrap();
        store.create_folder("Empty", "").await.unwrap();

        let export = export_training_images(&db).await.unwrap();
        assert_eq!(export.version, "2.0");
        assert_eq!(export.total_size, 2);
        assert_eq!(export.folders.len(), 2);
        assert_eq!(export.stats.total_images, 2);
    }

    #[tokio::test]
    async fn written_neural_export_is_camel_case_json() {
        let db = Database::in_memory().unwrap();
        TrainingSessionLedger::new(db.clone()).current_model().await.unwrap();
        let dir = tempfile::tempdir().unwrap();

        let path = write_export(&db, dir.path(), ExportKind::NeuralTraining)
            .await
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("neural_training_data_"));

        let json: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["version"], "1.0");
        assert_eq!(json["model"]["version"], "v1.0.0");
        assert_eq!(json["sessions"], Value::Array(Vec::new()));
        assert!(json.get("exportDate").is_some());
        assert_eq!(json["stats"]["totalSessions"], 0);
    }
}
