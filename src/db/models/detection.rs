//! Detection result models.
//!
//! `DetectionResult` is what a base detector reports for one frame;
//! `EnhancedDetectionResult` wraps it with training-derived adjustments and
//! ensemble metrics. Neither is stored on its own; the photo history embeds the
//! enhanced form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PpeLabels;

pub const STANDARD_MODEL_NAME: &str = "Standard Model";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectedItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    #[serde(flatten)]
    pub labels: PpeLabels,
    pub confidence: f64,
    pub details: String,
    pub overall_compliance: bool,
    pub timestamp: DateTime<Utc>,
    pub missing_items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_items: Option<Vec<DetectedItem>>,
    #[serde(default)]
    pub analysis_steps: Vec<String>,
}

impl DetectionResult {
    /// Builds a result whose missing-items list is derived from `labels`.
    pub fn new(
        labels: PpeLabels,
        confidence: f64,
        details: impl Into<String>,
        overall_compliance: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            labels,
            confidence,
            details: details.into(),
            overall_compliance,
            timestamp,
            missing_items: labels
                .missing()
                .into_iter()
                .map(|item| item.display_name().to_string())
                .collect(),
            detected_items: None,
            analysis_steps: Vec::new(),
        }
    }

    pub fn with_detected_items(mut self, items: Vec<DetectedItem>) -> Self {
        self.detected_items = Some(items);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingEnhancement {
    pub base_accuracy: f64,
    pub training_boost: f64,
    pub model_version: String,
    pub trained_images: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_match_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedDetectionResult {
    #[serde(flatten)]
    pub base: DetectionResult,
    pub neural_score: f64,
    pub model_agreement: f64,
    pub uncertainty_level: f64,
    pub cross_validation_score: f64,
    pub analysis_models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_enhancement: Option<TrainingEnhancement>,
    #[serde(default)]
    pub training_data_used: bool,
    #[serde(default)]
    pub training_images_count: usize,
}

impl EnhancedDetectionResult {
    /// Wraps a base result without any adjustment.
    pub fn from_base(base: DetectionResult) -> Self {
        let confidence = base.confidence;
        Self {
            base,
            neural_score: confidence,
            model_agreement: 100.0,
            uncertainty_level: 100.0 - confidence,
            cross_validation_score: confidence,
            analysis_models: vec![STANDARD_MODEL_NAME.to_string()],
            training_enhancement: None,
            training_data_used: false,
            training_images_count: 0,
        }
    }

    pub fn confidence(&self) -> f64 {
        self.base.confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_items_follow_labels() {
        let labels = PpeLabels {
            has_helmet: true,
            has_vest: true,
            ..PpeLabels::default()
        };
        let result = DetectionResult::new(labels, 80.0, "ok", false, Utc::now());

        assert_eq!(
            result.missing_items,
            vec!["Protective gloves", "Safety glasses", "Mask"]
        );
    }

    #[test]
    fn enhanced_result_serializes_flat() {
        let base = DetectionResult::new(PpeLabels::default(), 70.0, "base", false, Utc::now())
            .with_detected_items(vec![DetectedItem {
                kind: "helmet".into(),
                confidence: None,
            }]);
        let value = serde_json::to_value(EnhancedDetectionResult::from_base(base)).unwrap();

        assert_eq!(value["hasHelmet"], serde_json::json!(false));
        assert_eq!(value["confidence"], serde_json::json!(70.0));
        assert_eq!(value["detectedItems"][0]["type"], serde_json::json!("helmet"));
        assert_eq!(value["analysisModels"][0], serde_json::json!(STANDARD_MODEL_NAME));
        assert!(value.get("trainingEnhancement").is_none());
    }
}
