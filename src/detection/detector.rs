use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::json;

use crate::db::{DetectionResult, PpeItem};

use super::reply::parse_detection_reply;

/// Produces a base detection for one image.
#[async_trait]
pub trait BaseDetector: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<DetectionResult>;
}

/// Stand-in for a remote vision model. Builds a model-style text reply with
/// random labels and runs it through the same reply parser a real backend
/// would use.
#[derive(Debug, Clone)]
pub struct SimulatedDetector {
    presence_rate: f64,
}

impl SimulatedDetector {
    pub fn new(presence_rate: f64) -> Self {
        Self {
            presence_rate: presence_rate.clamp(0.0, 1.0),
        }
    }

    fn reply(&self, image_len: usize) -> String {
        let mut rng = rand::thread_rng();
        let present: Vec<PpeItem> = PpeItem::ALL
            .into_iter()
            .filter(|_| rng.gen_bool(self.presence_rate))
            .collect();
        let has = |item: PpeItem| present.contains(&item);
        let confidence = rng.gen_range(70.0..95.0_f64).round();
        let detected: Vec<_> = present
            .iter()
            .map(|item| json!({ "type": item.keyword(), "confidence": confidence }))
            .collect();

        let body = json!({
            "hasHelmet": has(PpeItem::Helmet),
            "hasGloves": has(PpeItem::Gloves),
            "hasSafetyGlasses": has(PpeItem::SafetyGlasses),
            "hasMask": has(PpeItem::Mask),
            "hasVest": has(PpeItem::Vest),
            "confidence": confidence,
            "details": format!("Simulated analysis of a {image_len} byte frame"),
            "overallCompliance": present.len() == PpeItem::ALL.len(),
            "detectedItems": detected,
        });
        format!("Analysis result:\n{body}")
    }
}

impl Default for SimulatedDetector {
    fn default() -> Self {
        Self::new(0.6)
    }
}

#[async_trait]
impl BaseDetector for SimulatedDetector {
    async fn detect(&self, image: &[u8]) -> Result<DetectionResult> {
        Ok(parse_detection_reply(&self.reply(image.len()), Utc::now()))
    }
}

/// Returns a clone of the configured result for every image.
#[derive(Debug, Clone)]
pub struct FixedDetector {
    result: DetectionResult,
}

impl FixedDetector {
    pub fn new(result: DetectionResult) -> Self {
        Self { result }
    }
}

#[async_trait]
impl BaseDetector for FixedDetector {
    async fn detect(&self, _image: &[u8]) -> Result<DetectionResult> {
        Ok(self.result.clone())
    }
}
