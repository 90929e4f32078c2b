use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::db::{EnhancedDetectionResult, SavedPhoto};
use crate::training::{
    ledger::improved_accuracy, LedgerStats, PredictionEnhancer, TrainingImageRepository,
    TrainingSessionLedger,
};

use super::detector::BaseDetector;
use super::photos::PhotoHistory;
use super::scoring::Scorer;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Clears the busy flag when dropped, whether the analysis finished, failed
/// or was cancelled by a timeout.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

const NEURAL_MARGIN: f64 = 2.0;
const MAX_NEURAL_SCORE: f64 = 100.0;
const MIN_UNCERTAINTY: f64 = 2.0;

/// Folds the trained model into a neural-path result: confidence becomes the
/// model's improved accuracy, and the neural score and uncertainty follow it.
pub fn apply_trained_model(result: &mut EnhancedDetectionResult, stats: &LedgerStats) {
    // improved_accuracy adds the model's own count, so pass only the rest.
    let extra = stats
        .total_images_processed
        .saturating_sub(stats.current_model.trained_images);
    let improved = improved_accuracy(&stats.current_model, result.confidence(), extra);
    result.base.confidence = improved;
    result.base.details = format!(
        "{} | Model trained with {} images (accuracy {}%)",
        result.base.details, stats.total_images_processed, stats.current_model.accuracy
    );
    result.neural_score = (improved + NEURAL_MARGIN).min(MAX_NEURAL_SCORE);
    result.uncertainty_level = (100.0 - result.neural_score - 5.0).max(MIN_UNCERTAINTY);
}

/// detect -> enhance -> trained model -> ensemble -> save, one frame at a time.
pub struct DetectionPipeline {
    detector: Arc<dyn BaseDetector>,
    scorer: Arc<dyn Scorer>,
    repository: TrainingImageRepository,
    ledger: TrainingSessionLedger,
    enhancer: PredictionEnhancer,
    photos: PhotoHistory,
    neural_analysis: bool,
    busy: AtomicBool,
}

impl DetectionPipeline {
    pub fn new(
        detector: Arc<dyn BaseDetector>,
        scorer: Arc<dyn Scorer>,
        repository: TrainingImageRepository,
        ledger: TrainingSessionLedger,
        photos: PhotoHistory,
    ) -> Self {
        Self {
            detector,
            scorer,
            repository,
            ledger,
            enhancer: PredictionEnhancer::new(),
            photos,
            neural_analysis: true,
            busy: AtomicBool::new(false),
        }
    }

    /// With neural analysis off, the base result is stored as-is.
    pub fn with_neural_analysis(mut self, enabled: bool) -> Self {
        self.neural_analysis = enabled;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Analyses one frame and stores it in the photo history. Returns `None`
    /// without doing any work if another analysis is still running.
    pub async fn analyze_frame(&self, image: &[u8]) -> Result<Option<SavedPhoto>> {
        if self.busy.swap(true, Ordering::AcqRel) {
            log_info!("analysis already in progress, skipping frame");
            return Ok(None);
        }
        let _guard = BusyGuard(&self.busy);

        let mut base = self
            .detector
            .detect(image)
            .await
            .context("base detection failed")?;
        base.analysis_steps.push("Base detection".to_string());

        let result = if self.neural_analysis {
            let scores = self.scorer.ensemble(&base);
            let mut enhanced = self
                .enhancer
                .enhance_from(&self.repository, base)
                .await
                .context("training enhancement failed")?;
            enhanced
                .base
                .analysis_steps
                .push("Training data enhancement".to_string());
            let stats = self
                .ledger
                .stats()
                .await
                .context("failed to read training ledger")?;
            apply_trained_model(&mut enhanced, &stats);
            enhanced.base.analysis_steps.push("Trained model adjustment".to_string());
            scores.apply_to(&mut enhanced);
            enhanced.base.analysis_steps.push("Ensemble scoring".to_string());
            enhanced
        } else {
            EnhancedDetectionResult::from_base(base)
        };

        let photo = self
            .photos
            .save(&STANDARD.encode(image), result)
            .await
            .context("failed to store detection photo")?;

        log_info!(
            "frame analysed: confidence {:.1}, compliant {}, missing {:?}",
            photo.detection_result.confidence(),
            photo.detection_result.base.overall_compliance,
            photo.detection_result.base.missing_items
        );
        Ok(Some(photo))
    }
}
