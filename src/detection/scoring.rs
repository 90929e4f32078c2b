//! Pluggable scoring for the parts of the pipeline that have no real model
//! behind them: ensemble agreement metrics and training-run outcomes.

use rand::Rng;

use crate::db::{DetectionResult, EnhancedDetectionResult};

pub const ENSEMBLE_MODELS: [&str; 4] = [
    "CNN_Primary_v2.1",
    "ResNet_Secondary_v1.8",
    "VisionTransformer_v1.5",
    "EfficientNet_Custom",
];

const MAX_CROSS_VALIDATION: f64 = 98.0;

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleScores {
    pub model_agreement: f64,
    pub cross_validation_score: f64,
    pub analysis_models: Vec<String>,
}

impl EnsembleScores {
    pub fn apply_to(self, result: &mut EnhancedDetectionResult) {
        result.model_agreement = self.model_agreement;
        result.cross_validation_score = self.cross_validation_score;
        result.analysis_models = self.analysis_models;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingOutcome {
    pub accuracy: f64,
    pub validation_loss: f64,
    pub training_time_secs: f64,
}

pub trait Scorer: Send + Sync {
    fn ensemble(&self, result: &DetectionResult) -> EnsembleScores;
    fn training_outcome(&self, total_images: u64) -> TrainingOutcome;
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Mean agreement penalised by twice the accuracy variance, capped at 98.
pub fn cross_validation(accuracies: &[f64], agreements: &[f64]) -> f64 {
    if agreements.is_empty() {
        return 0.0;
    }
    let agreement = agreements.iter().sum::<f64>() / agreements.len() as f64;
    (agreement - variance(accuracies) * 2.0).min(MAX_CROSS_VALIDATION)
}

/// Randomised scorer producing values in the ranges the demo UI expects.
#[derive(Debug, Clone, Default)]
pub struct SimulatedScorer;

impl Scorer for SimulatedScorer {
    fn ensemble(&self, result: &DetectionResult) -> EnsembleScores {
        let mut rng = rand::thread_rng();
        let base = result.confidence;
        let accuracies: Vec<f64> = [
            base - 2.0 + rng.gen_range(0.0..4.0),
            base - 1.0 + rng.gen_range(0.0..3.0),
            base + rng.gen_range(0.0..2.0),
        ]
        .into_iter()
        .map(|accuracy| accuracy.clamp(75.0, 97.0))
        .collect();
        let agreements: Vec<f64> = (0..accuracies.len())
            .map(|_| 85.0 + rng.gen_range(0.0..12.0))
            .collect();

        EnsembleScores {
            model_agreement: agreements.iter().sum::<f64>() / agreements.len() as f64,
            cross_validation_score: cross_validation(&accuracies, &agreements),
            analysis_models: ENSEMBLE_MODELS.iter().map(|name| name.to_string()).collect(),
        }
    }

    fn training_outcome(&self, _total_images: u64) -> TrainingOutcome {
        let mut rng = rand::thread_rng();
        TrainingOutcome {
            accuracy: 95.0 + rng.gen_range(0.0..4.0),
            validation_loss: 0.05 + rng.gen_range(0.0..0.03),
            training_time_secs: 90.0 + rng.gen_range(0.0..60.0),
        }
    }
}

/// Deterministic scorer returning the same values on every call.
#[derive(Debug, Clone)]
pub struct FixedScorer {
    pub scores: EnsembleScores,
    pub outcome: TrainingOutcome,
}

impl Default for FixedScorer {
    fn default() -> Self {
        Self {
            scores: EnsembleScores {
                model_agreement: 90.0,
                cross_validation_score: 88.0,
                analysis_models: ENSEMBLE_MODELS.iter().map(|name| name.to_string()).collect(),
            },
            outcome: TrainingOutcome {
                accuracy: 96.0,
                validation_loss: 0.06,
                training_time_secs: 120.0,
            },
        }
    }
}

impl Scorer for FixedScorer {
    fn ensemble(&self, _result: &DetectionResult) -> EnsembleScores {
        self.scores.clone()
    }

    fn training_outcome(&self, _total_images: u64) -> TrainingOutcome {
        self.outcome
    }
}
