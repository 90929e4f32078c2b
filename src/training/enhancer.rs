//! Training-data-backed confidence adjustment.

use anyhow::Result;

use crate::db::{DetectedItem, DetectionResult, EnhancedDetectionResult, PpeItem, TrainingEnhancement, TrainingSample};

use super::repository::{TrainingImageRepository, TrainingSnapshot};

/// Samples compared against a detection when estimating the pattern match.
pub const PATTERN_SAMPLE_LIMIT: usize = 20;
pub const MAX_ENHANCED_CONFIDENCE: f64 = 98.0;
const NEUTRAL_PATTERN_MATCH: f64 = 0.5;
const PATTERN_WEIGHT: f64 = 10.0;
const CONFIDENCE_WEIGHT: f64 = 5.0;

fn normalize(kind: &str) -> String {
    kind.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn item_detected(items: &[DetectedItem], item: PpeItem) -> bool {
    items
        .iter()
        .any(|detected| normalize(&detected.kind).contains(item.keyword()))
}

/// Share of label comparisons where the detection agrees with the stored
/// samples, over at most [`PATTERN_SAMPLE_LIMIT`] samples. Without a
/// structured item list there is nothing to compare and 0.5 is returned.
pub fn pattern_match(base: &DetectionResult, samples: &[TrainingSample]) -> f64 {
    let Some(items) = base.detected_items.as_deref() else {
        return NEUTRAL_PATTERN_MATCH;
    };

    let mut matches = 0usize;
    let mut total = 0usize;
    for sample in samples.iter().take(PATTERN_SAMPLE_LIMIT) {
        for item in PpeItem::ALL {
            total += 1;
            if item_detected(items, item) == sample.labels.get(item) {
                matches += 1;
            }
        }
    }

    if total == 0 {
        NEUTRAL_PATTERN_MATCH
    } else {
        matches as f64 / total as f64
    }
}

pub fn confidence_boost(pattern_match: f64, avg_confidence_score: f64) -> f64 {
    pattern_match * PATTERN_WEIGHT + (avg_confidence_score / 100.0) * CONFIDENCE_WEIGHT
}

#[derive(Debug, Clone, Default)]
pub struct PredictionEnhancer;

impl PredictionEnhancer {
    pub fn new() -> Self {
        Self
    }

    /// Adjusts `base` using the snapshot. With no eligible samples the base
    /// result is passed through untouched.
    pub fn enhance(&self, base: DetectionResult, snapshot: &TrainingSnapshot) -> EnhancedDetectionResult {
        if snapshot.high_quality.is_empty() {
            return EnhancedDetectionResult::from_base(base);
        }

        let pattern = pattern_match(&base, &snapshot.high_quality);
        let boost = confidence_boost(pattern, snapshot.stats.avg_confidence_score);
        let confidence = (base.confidence + boost).min(MAX_ENHANCED_CONFIDENCE);
        let sample_count = snapshot.high_quality.len();

        let mut adjusted = base;
        adjusted.confidence = confidence;
        adjusted.details = format!(
            "{} | Training data: {} high-quality samples (pattern match {}%)",
            adjusted.details,
            sample_count,
            (pattern * 100.0).round()
        );

        let mut enhanced = EnhancedDetectionResult::from_base(adjusted);
        enhanced.training_data_used = true;
        enhanced.training_images_count = sample_count;
        enhanced.training_enhancement = Some(TrainingEnhancement {
            base_accuracy: confidence - boost,
            training_boost: boost,
            model_version: snapshot.model.version.clone(),
            trained_images: snapshot.stats.total_images,
            pattern_match_score: Some(pattern),
        });
        enhanced
    }

    /// Takes a fresh snapshot from the repository, then enhances.
    pub async fn enhance_from(
        &self,
        repository: &TrainingImageRepository,
        base: DetectionResult,
    ) -> Result<EnhancedDetectionResult> {
        let snapshot = repository.snapshot().await?;
        Ok(self.enhance(base, &snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::db::{CurrentModel, PpeLabels, TrainingFolder};
    use crate::training::{
        repository::{compute_stats, rank_for_prediction},
        upload::ImageUpload,
    };

    const MIB: u64 = 1024 * 1024;

    fn base(confidence: f64) -> DetectionResult {
        DetectionResult::new(
            PpeLabels {
                has_helmet: true,
                ..PpeLabels::default()
            },
            confidence,
            "base details",
            false,
            Utc::now(),
        )
    }

    fn sample(labels: PpeLabels) -> TrainingSample {
        ImageUpload::from_bytes("s.jpg", vec![0])
            .with_declared_size(3 * MIB)
            .into_sample(labels, None, Utc::now())
    }

    fn snapshot_of(samples: Vec<TrainingSample>) -> TrainingSnapshot {
        let mut folder = TrainingFolder::new("f".into(), "F".into(), String::new(), Utc::now());
        folder.images = samples;
        folder.recompute_aggregates();
        let folders = vec![folder];
        TrainingSnapshot {
            high_quality: rank_for_prediction(&folders, 50),
            stats: compute_stats(&folders),
            model: CurrentModel::initial(Utc::now()),
        }
    }

    fn empty_snapshot() -> TrainingSnapshot {
        TrainingSnapshot {
            high_quality: Vec::new(),
            stats: compute_stats(&[]),
            model: CurrentModel::initial(Utc::now()),
        }
    }

    fn item(kind: &str) -> DetectedItem {
        DetectedItem {
            kind: kind.into(),
            confidence: None,
        }
    }

    #[test]
    fn empty_repository_is_identity() {
        let original = base(70.0);
        let enhanced = PredictionEnhancer::new().enhance(original.clone(), &empty_snapshot());

        assert_eq!(enhanced.base, original);
        assert_eq!(enhanced.confidence(), 70.0);
        assert!(!enhanced.training_data_used);
        assert!(enhanced.training_enhancement.is_none());
    }

    #[test]
    fn samples_below_high_quality_do_not_count() {
        let low = ImageUpload::from_bytes("s.jpg", vec![0])
            .with_declared_size(10)
            .into_sample(PpeLabels::default(), None, Utc::now());
        let original = base(70.0);
        let enhanced = PredictionEnhancer::new().enhance(original.clone(), &snapshot_of(vec![low]));
        assert_eq!(enhanced.base, original);
    }

    #[test]
    fn pattern_match_defaults_without_item_list() {
        assert_eq!(pattern_match(&base(50.0), &[sample(PpeLabels::default())]), 0.5);
    }

    #[test]
    fn pattern_match_compares_every_label() {
        let labels = PpeLabels {
            has_helmet: true,
            has_safety_glasses: true,
            ..PpeLabels::default()
        };
        let detection = base(50.0).with_detected_items(vec![item("Helmet"), item("safety_glasses")]);
        assert_eq!(pattern_match(&detection, &[sample(labels)]), 1.0);

        let partial = base(50.0).with_detected_items(vec![item("vest")]);
        // helmet and glasses disagree, vest disagrees, gloves and mask agree.
        assert_eq!(pattern_match(&partial, &[sample(labels)]), 2.0 / 5.0);
    }

    #[test]
    fn pattern_match_uses_first_twenty_samples_only() {
        let present = PpeLabels {
            has_helmet: true,
            has_gloves: true,
            has_safety_glasses: true,
            has_mask: true,
            has_vest: true,
        };
        let mut samples: Vec<TrainingSample> = (0..PATTERN_SAMPLE_LIMIT).map(|_| sample(present)).collect();
        samples.extend((0..10).map(|_| sample(PpeLabels::default())));

        let detection = base(50.0).with_detected_items(
            ["helmet", "gloves", "safety glasses", "mask", "vest"]
                .into_iter()
                .map(item)
                .collect(),
        );
        assert_eq!(pattern_match(&detection, &samples), 1.0);
    }

    #[test]
    fn boost_formula_matches_reference_values() {
        let boost = confidence_boost(0.6, 80.0);
        assert!((boost - 10.0).abs() < 1e-9);
        assert!(((65.0_f64 + boost).min(MAX_ENHANCED_CONFIDENCE) - 75.0).abs() < 1e-9);
        assert_eq!((95.0_f64 + boost).min(MAX_ENHANCED_CONFIDENCE), 98.0);
    }

    #[test]
    fn fifteen_samples_at_eighty_boost_by_pattern_and_confidence() {
        let labels = PpeLabels {
            has_helmet: true,
            has_gloves: true,
            ..PpeLabels::default()
        };
        let snapshot = snapshot_of((0..15).map(|_| sample(labels)).collect());
        assert_eq!(snapshot.stats.avg_confidence_score, 80.0);

        // Detecting helmet and mask: helmet, glasses and vest agree (3 of 5).
        let detection = base(60.0).with_detected_items(vec![item("helmet"), item("mask")]);
        let enhanced = PredictionEnhancer::new().enhance(detection, &snapshot);

        let extra = enhanced.training_enhancement.clone().unwrap();
        assert!((extra.pattern_match_score.unwrap() - 0.6).abs() < 1e-9);
        assert!((extra.training_boost - 10.0).abs() < 1e-9);
        assert!((enhanced.confidence() - 70.0).abs() < 1e-9);
        assert!((extra.base_accuracy - 60.0).abs() < 1e-9);
        assert_eq!(extra.trained_images, 15);
        assert_eq!(extra.model_version, "v1.0.0");
        assert!(enhanced.training_data_used);
        assert_eq!(enhanced.training_images_count, 15);
    }

    #[test]
    fn enhancement_is_bounded_and_append_only() {
        let snapshot = snapshot_of(vec![sample(PpeLabels::default())]);
        for confidence in [0.0, 42.0, 90.0, 97.5, 100.0] {
            let original = base(confidence);
            let enhanced = PredictionEnhancer::new().enhance(original.clone(), &snapshot);

            assert!(enhanced.confidence() <= MAX_ENHANCED_CONFIDENCE.max(confidence));
            assert!(enhanced.confidence() >= confidence.min(MAX_ENHANCED_CONFIDENCE));
            assert!(enhanced.base.details.starts_with(&original.details));
            assert!(enhanced.base.details.len() > original.details.len());
            assert_eq!(enhanced.base.labels, original.labels);
            assert_eq!(enhanced.base.missing_items, original.missing_items);
        }
    }

    #[test]
    fn trained_images_counts_every_stored_sample() {
        let sized = |size: u64| {
            ImageUpload::from_bytes("s.jpg", vec![0])
                .with_declared_size(size)
                .into_sample(PpeLabels::default(), None, Utc::now())
        };
        let snapshot = snapshot_of(vec![
            sample(PpeLabels::default()),
            sample(PpeLabels::default()),
            sized(MIB),
            sized(10),
        ]);

        let enhanced = PredictionEnhancer::new().enhance(base(60.0), &snapshot);

        // Only the two high-quality samples drive the boost, but the model
        // summary reports everything stored.
        assert_eq!(enhanced.training_images_count, 2);
        assert_eq!(enhanced.training_enhancement.as_ref().unwrap().trained_images, 4);
        assert_eq!(enhanced.neural_score, enhanced.confidence());
        assert_eq!(enhanced.uncertainty_level, 100.0 - enhanced.confidence());
    }
}
