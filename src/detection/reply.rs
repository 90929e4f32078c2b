//! Turns a vision model's free-text reply into a [`DetectionResult`].
//!
//! The reply is expected to carry a JSON object somewhere in its text. When
//! that object cannot be parsed, a keyword scan over the text is used instead
//! and the result is marked for manual review.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::db::{DetectedItem, DetectionResult, PpeItem, PpeLabels};

const DEFAULT_CONFIDENCE: f64 = 75.0;
const RECOVERY_CONFIDENCE: f64 = 50.0;
const RECOVERY_EXCERPT_CHARS: usize = 200;
pub const MANUAL_REVIEW_ITEM: &str = "Analysis requires manual review";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelReply {
    #[serde(default)]
    has_helmet: bool,
    #[serde(default)]
    has_gloves: bool,
    #[serde(default)]
    has_safety_glasses: bool,
    #[serde(default)]
    has_mask: bool,
    #[serde(default)]
    has_vest: bool,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    overall_compliance: bool,
    #[serde(default)]
    detected_items: Option<Vec<DetectedItem>>,
}

/// Slice between the first `{` and the last `}`, or the trimmed text.
fn json_fragment(content: &str) -> &str {
    let trimmed = content.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Numeric confidence clamped to [0, 100]. Missing, zero or non-numeric
/// values fall back to 75.
fn reply_confidence(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(confidence) if confidence.is_finite() && confidence != 0.0 => confidence.clamp(0.0, 100.0),
        _ => DEFAULT_CONFIDENCE,
    }
}

fn keyword_labels(content: &str) -> PpeLabels {
    let lower = content.to_lowercase();
    let mut labels = PpeLabels::default();
    for item in PpeItem::ALL {
        let synonyms: &[&str] = match item {
            PpeItem::Helmet => &["helmet", "casco"],
            PpeItem::Gloves => &["gloves", "guantes"],
            PpeItem::SafetyGlasses => &["glasses", "gafas"],
            PpeItem::Mask => &["mask", "mascarilla"],
            PpeItem::Vest => &["vest", "chaleco"],
        };
        labels.set(item, synonyms.iter().any(|word| lower.contains(word)));
    }
    labels
}

pub fn parse_detection_reply(content: &str, timestamp: DateTime<Utc>) -> DetectionResult {
    match serde_json::from_str::<ModelReply>(json_fragment(content)) {
        Ok(reply) => {
            let labels = PpeLabels {
                has_helmet: reply.has_helmet,
                has_gloves: reply.has_gloves,
                has_safety_glasses: reply.has_safety_glasses,
                has_mask: reply.has_mask,
                has_vest: reply.has_vest,
            };
            let details = reply
                .details
                .filter(|details| !details.is_empty())
                .unwrap_or_else(|| "Analysis completed".to_string());
            let mut result = DetectionResult::new(
                labels,
                reply_confidence(reply.confidence.as_ref()),
                details,
                reply.overall_compliance,
                timestamp,
            );
            result.detected_items = reply.detected_items;
            result
        }
        Err(_) => {
            let excerpt: String = content.chars().take(RECOVERY_EXCERPT_CHARS).collect();
            let mut result = DetectionResult::new(
                keyword_labels(content),
                RECOVERY_CONFIDENCE,
                format!("Text analysis (recovery mode): {excerpt}..."),
                false,
                timestamp,
            );
            result.missing_items = vec![MANUAL_REVIEW_ITEM.to_string()];
            result
                .analysis_steps
                .push("Using recovery mode after a parse error".to_string());
            result
        }
    }
}
