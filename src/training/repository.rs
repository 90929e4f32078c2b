use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{CurrentModel, Database, PpeItem, Quality, TrainingFolder, TrainingSample};

use super::folders::load_folders;
use super::ledger::load_or_init_model;

pub const DEFAULT_PREDICTION_LIMIT: usize = 50;
/// High-quality samples needed before the repository reports it is ready.
pub const READY_FOR_PREDICTION_MIN: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStats {
    pub total_folders: usize,
    pub total_images: usize,
    pub high_quality_images: usize,
    pub medium_quality_images: usize,
    pub low_quality_images: usize,
    pub images_with_helmet: usize,
    pub images_with_gloves: usize,
    pub images_with_glasses: usize,
    pub images_with_mask: usize,
    pub images_with_vest: usize,
    /// Mean of the per-folder quality averages, not a per-sample mean.
    pub avg_quality_score: f64,
    /// Mean of the per-folder confidence averages, not a per-sample mean.
    pub avg_confidence_score: f64,
    pub ready_for_prediction: bool,
}

/// Everything the enhancer reads, taken in one database task.
#[derive(Debug, Clone)]
pub struct TrainingSnapshot {
    pub high_quality: Vec<TrainingSample>,
    pub stats: TrainingStats,
    pub model: CurrentModel,
}

pub fn flatten_samples(folders: &[TrainingFolder]) -> Vec<TrainingSample> {
    folders
        .iter()
        .flat_map(|folder| folder.images.iter().cloned())
        .collect()
}

/// Eligible samples ranked by confidence, highest first. The sort is stable,
/// so equal confidences keep folder-then-sample order.
pub fn rank_for_prediction(folders: &[TrainingFolder], limit: usize) -> Vec<TrainingSample> {
    let mut eligible: Vec<TrainingSample> = folders
        .iter()
        .flat_map(|folder| folder.images.iter())
        .filter(|image| image.used_for_prediction && image.quality == Quality::High)
        .cloned()
        .collect();
    eligible.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    eligible.truncate(limit);
    eligible
}

pub fn compute_stats(folders: &[TrainingFolder]) -> TrainingStats {
    let images: Vec<&TrainingSample> = folders.iter().flat_map(|folder| folder.images.iter()).collect();
    let count_quality = |quality: Quality| images.iter().filter(|image| image.quality == quality).count();
    let count_label = |item: PpeItem| images.iter().filter(|image| image.labels.get(item)).count();

    let folder_mean = |value: fn(&TrainingFolder) -> f64| {
        if folders.is_empty() {
            0.0
        } else {
            folders.iter().map(value).sum::<f64>() / folders.len() as f64
        }
    };

    let high_quality_images = count_quality(Quality::High);

    TrainingStats {
        total_folders: folders.len(),
        total_images: images.len(),
        high_quality_images,
        medium_quality_images: count_quality(Quality::Medium),
        low_quality_images: count_quality(Quality::Low),
        images_with_helmet: count_label(PpeItem::Helmet),
        images_with_gloves: count_label(PpeItem::Gloves),
        images_with_glasses: count_label(PpeItem::SafetyGlasses),
        images_with_mask: count_label(PpeItem::Mask),
        images_with_vest: count_label(PpeItem::Vest),
        avg_quality_score: folder_mean(|folder: &TrainingFolder| folder.avg_quality),
        avg_confidence_score: folder_mean(|folder: &TrainingFolder| folder.avg_confidence),
        ready_for_prediction: high_quality_images >= READY_FOR_PREDICTION_MIN,
    }
}

/// Read-only views across every folder.
#[derive(Clone)]
pub struct TrainingImageRepository {
    db: Database,
}

impl TrainingImageRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn all_samples(&self) -> Result<Vec<TrainingSample>> {
        self.db
            .execute(|conn| Ok(flatten_samples(&load_folders(conn)?)))
            .await
    }

    pub async fn sample_count(&self) -> Result<usize> {
        self.db
            .execute(|conn| {
                Ok(load_folders(conn)?
                    .iter()
                    .map(|folder| folder.images.len())
                    .sum())
            })
            .await
    }

    pub async fn high_quality_samples_for_prediction(&self, limit: usize) -> Result<Vec<TrainingSample>> {
        self.db
            .execute(move |conn| Ok(rank_for_prediction(&load_folders(conn)?, limit)))
            .await
    }

    pub async fn stats(&self) -> Result<TrainingStats> {
        self.db
            .execute(|conn| Ok(compute_stats(&load_folders(conn)?)))
            .await
    }

    pub async fn snapshot(&self) -> Result<TrainingSnapshot> {
        self.db
            .execute(|conn| {
                let folders = load_folders(conn)?;
                let model = load_or_init_model(conn, Utc::now())?;
                Ok(TrainingSnapshot {
                    high_quality: rank_for_prediction(&folders, DEFAULT_PREDICTION_LIMIT),
                    stats: compute_stats(&folders),
                    model,
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::PpeLabels;
    use crate::training::{folders::TrainingFolderStore, upload::ImageUpload};

    const MIB: u64 = 1024 * 1024;

    fn labels(count: usize) -> PpeLabels {
        let mut labels = PpeLabels::default();
        for item in PpeItem::ALL.iter().take(count) {
            labels.set(*item, true);
        }
        labels
    }

    fn named_upload(name: &str, size: u64) -> ImageUpload {
        ImageUpload::from_bytes(name, vec![0; 4]).with_declared_size(size)
    }

    async fn seeded() -> (TrainingFolderStore, TrainingImageRepository) {
        let db = Database::in_memory().unwrap();
        (TrainingFolderStore::new(db.clone()), TrainingImageRepository::new(db))
    }

    #[tokio::test]
    async fn empty_repository_has_zero_stats() {
        let (_, repo) = seeded().await;
        let stats = repo.stats().await.unwrap();

        assert_eq!(stats, TrainingStats::default());
        assert!(repo.all_samples().await.unwrap().is_empty());
        assert!(repo
            .high_quality_samples_for_prediction(DEFAULT_PREDICTION_LIMIT)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn all_samples_are_folder_then_sample_ordered() {
        let (store, repo) = seeded().await;
        let a = store.create_folder("A", "").await.unwrap();
        let b = store.create_folder("B", "").await.unwrap();
        store.save_sample(named_upload("b1", 10), labels(0), Some(&b.id), None).await.unwrap();
        store.save_sample(named_upload("a1", 10), labels(0), Some(&a.id), None).await.unwrap();
        store.save_sample(named_upload("a2", 10), labels(0), Some(&a.id), None).await.unwrap();

        let names: Vec<String> = repo
            .all_samples()
            .await
            .unwrap()
            .into_iter()
            .map(|sample| sample.file_name)
            .collect();
        assert_eq!(names, vec!["a1", "a2", "b1"]);
        assert_eq!(repo.sample_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn prediction_set_filters_ranks_and_truncates() {
        let (store, repo) = seeded().await;
        let folder = store.create_folder("F", "").await.unwrap();
        let uploads = vec![
            (named_upload("high-1", 3 * MIB), labels(1)),
            (named_upload("medium", MIB), labels(5)),
            (named_upload("high-4", 3 * MIB), labels(4)),
            (named_upload("high-1b", 3 * MIB), labels(1)),
            (named_upload("high-2", 3 * MIB), labels(2)),
        ];
        store.save_samples(uploads, Some(&folder.id), None).await.unwrap();

        let ranked: Vec<String> = repo
            .high_quality_samples_for_prediction(DEFAULT_PREDICTION_LIMIT)
            .await
            .unwrap()
            .into_iter()
            .map(|sample| sample.file_name)
            .collect();
        // Ties keep upload order.
        assert_eq!(ranked, vec!["high-4", "high-2", "high-1", "high-1b"]);

        let top_two = repo.high_quality_samples_for_prediction(2).await.unwrap();
        assert_eq!(top_two.len(), 2);
        assert_eq!(top_two[0].file_name, "high-4");
    }

    #[test]
    fn samples_not_used_for_prediction_are_skipped() {
        let mut folder = TrainingFolder::new("f".into(), "F".into(), String::new(), Utc::now());
        let mut sample = named_upload("x", 3 * MIB).into_sample(labels(3), None, Utc::now());
        sample.used_for_prediction = false;
        folder.images.push(sample);
        folder.recompute_aggregates();

        assert!(rank_for_prediction(&[folder], DEFAULT_PREDICTION_LIMIT).is_empty());
    }

    #[tokio::test]
    async fn averages_are_mean_of_folder_means() {
        let (store, repo) = seeded().await;
        let big = store.create_folder("Big", "").await.unwrap();
        let small = store.create_folder("Small", "").await.unwrap();

        // Big: three high-quality samples (rank 3). Small: one low (rank 1).
        let uploads = (0..3)
            .map(|i| (named_upload(&format!("big-{i}"), 3 * MIB), labels(0)))
            .collect();
        store.save_samples(uploads, Some(&big.id), None).await.unwrap();
        store
            .save_sample(named_upload("small", 10), labels(5), Some(&small.id), None)
            .await
            .unwrap();

        let stats = repo.stats().await.unwrap();
        // A flat mean would give (3+3+3+1)/4 = 2.5.
        assert_eq!(stats.avg_quality_score, 2.0);
        assert_eq!(stats.avg_confidence_score, (70.0 + 95.0) / 2.0);
        assert_eq!(stats.high_quality_images, 3);
        assert_eq!(stats.low_quality_images, 1);
        assert_eq!(stats.images_with_vest, 1);
        assert_eq!(stats.images_with_helmet, 1);
        assert!(!stats.ready_for_prediction);
    }

    #[tokio::test]
    async fn ready_once_ten_high_quality_samples_exist() {
        let (store, repo) = seeded().await;
        let uploads = (0..READY_FOR_PREDICTION_MIN)
            .map(|i| (named_upload(&format!("s{i}"), 3 * MIB), labels(2)))
            .collect();
        store.save_samples(uploads, None, None).await.unwrap();

        let stats = repo.stats().await.unwrap();
        assert!(stats.ready_for_prediction);
        assert_eq!(stats.total_folders, 1);
    }
}
