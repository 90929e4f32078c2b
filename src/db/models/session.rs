//! Training session ledger models.
//!
//! Sessions are immutable records of a (simulated) training run; the current
//! model descriptor is the running summary they fold into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL_VERSION: &str = "v1.0.0";
pub const DEFAULT_MODEL_ACCURACY: f64 = 85.0;
const LEARNING_RATE: f64 = 0.001;
const BATCH_SIZE: u32 = 32;
const DEFAULT_EPOCHS: u32 = 10;
const DEFAULT_LAYERS: u32 = 6;
const TRAINED_LAYERS: u32 = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    Failed,
    InProgress,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::InProgress => "in_progress",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSession {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub total_images: u64,
    pub accuracy: f64,
    pub model_version: String,
    pub epochs: u32,
    pub validation_loss: f64,
    /// Seconds.
    pub training_time: f64,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelParameters {
    pub learning_rate: f64,
    pub batch_size: u32,
    pub epochs: u32,
    pub layers: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentModel {
    pub version: String,
    pub accuracy: f64,
    pub trained_images: u64,
    pub last_training: DateTime<Utc>,
    pub parameters: ModelParameters,
}

impl CurrentModel {
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            version: DEFAULT_MODEL_VERSION.to_string(),
            accuracy: DEFAULT_MODEL_ACCURACY,
            trained_images: 0,
            last_training: now,
            parameters: ModelParameters {
                learning_rate: LEARNING_RATE,
                batch_size: BATCH_SIZE,
                epochs: DEFAULT_EPOCHS,
                layers: DEFAULT_LAYERS,
            },
        }
    }

    /// Starting point for the running maximum when a session is recorded
    /// before anything has read (and thereby persisted) the initial model.
    pub fn blank(now: DateTime<Utc>) -> Self {
        Self {
            accuracy: 0.0,
            ..Self::initial(now)
        }
    }

    /// Folds a newly recorded session into the descriptor. Accuracy keeps the
    /// running maximum and trained images the running sum.
    pub fn absorb(&self, session: &TrainingSession) -> Self {
        Self {
            version: session.model_version.clone(),
            accuracy: self.accuracy.max(session.accuracy),
            trained_images: self.trained_images.saturating_add(session.total_images),
            last_training: session.timestamp,
            parameters: ModelParameters {
                learning_rate: LEARNING_RATE,
                batch_size: BATCH_SIZE,
                epochs: session.epochs,
                layers: TRAINED_LAYERS,
            },
        }
    }
}
