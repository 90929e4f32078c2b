use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TrainingSample;

/// Named, ordered collection of samples. The aggregate fields are derived and
/// must be refreshed through [`TrainingFolder::recompute_aggregates`] after any
/// change to `images`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingFolder {
    pub id: String,
    pub name: String,
    pub description: String,
    pub images: Vec<TrainingSample>,
    #[serde(rename = "createdDate")]
    pub created_at: DateTime<Utc>,
    pub total_images: usize,
    pub avg_quality: f64,
    pub avg_confidence: f64,
}

impl TrainingFolder {
    pub fn new(id: String, name: String, description: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            description,
            images: Vec::new(),
            created_at,
            total_images: 0,
            avg_quality: 0.0,
            avg_confidence: 0.0,
        }
    }

    pub fn recompute_aggregates(&mut self) {
        self.total_images = self.images.len();
        if self.images.is_empty() {
            self.avg_quality = 0.0;
            self.avg_confidence = 0.0;
            return;
        }

        let count = self.images.len() as f64;
        let quality_sum: f64 = self
            .images
            .iter()
            .map(|image| f64::from(image.quality.rank()))
            .sum();
        let confidence_sum: f64 = self.images.iter().map(|image| image.confidence).sum();

        self.avg_quality = quality_sum / count;
        self.avg_confidence = confidence_sum / count;
    }
}
