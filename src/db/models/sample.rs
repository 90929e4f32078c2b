//! Training sample data models.
//!
//! A sample is one labeled upload. Its quality tier and confidence are derived
//! once when it is created and never recomputed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    High,
    Medium,
    Low,
}

impl Quality {
    /// Numeric rank used for folder averages.
    pub fn rank(self) -> u8 {
        match self {
            Quality::High => 3,
            Quality::Medium => 2,
            Quality::Low => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::High => "high",
            Quality::Medium => "medium",
            Quality::Low => "low",
        }
    }
}

/// The five tracked pieces of equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PpeItem {
    Helmet,
    Gloves,
    SafetyGlasses,
    Mask,
    Vest,
}

impl PpeItem {
    pub const ALL: [PpeItem; 5] = [
        PpeItem::Helmet,
        PpeItem::Gloves,
        PpeItem::SafetyGlasses,
        PpeItem::Mask,
        PpeItem::Vest,
    ];

    /// Lowercase, separator-free token matched against detected item types.
    pub fn keyword(self) -> &'static str {
        match self {
            PpeItem::Helmet => "helmet",
            PpeItem::Gloves => "gloves",
            PpeItem::SafetyGlasses => "safetyglasses",
            PpeItem::Mask => "mask",
            PpeItem::Vest => "vest",
        }
    }

    /// Name reported in a detection's missing-items list.
    pub fn display_name(self) -> &'static str {
        match self {
            PpeItem::Helmet => "Safety helmet",
            PpeItem::Gloves => "Protective gloves",
            PpeItem::SafetyGlasses => "Safety glasses",
            PpeItem::Mask => "Mask",
            PpeItem::Vest => "Safety vest",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PpeLabels {
    pub has_helmet: bool,
    pub has_gloves: bool,
    pub has_safety_glasses: bool,
    pub has_mask: bool,
    pub has_vest: bool,
}

impl PpeLabels {
    pub fn get(&self, item: PpeItem) -> bool {
        match item {
            PpeItem::Helmet => self.has_helmet,
            PpeItem::Gloves => self.has_gloves,
            PpeItem::SafetyGlasses => self.has_safety_glasses,
            PpeItem::Mask => self.has_mask,
            PpeItem::Vest => self.has_vest,
        }
    }

    pub fn set(&mut self, item: PpeItem, value: bool) {
        match item {
            PpeItem::Helmet => self.has_helmet = value,
            PpeItem::Gloves => self.has_gloves = value,
            PpeItem::SafetyGlasses => self.has_safety_glasses = value,
            PpeItem::Mask => self.has_mask = value,
            PpeItem::Vest => self.has_vest = value,
        }
    }

    pub fn count_true(&self) -> u32 {
        PpeItem::ALL.iter().filter(|item| self.get(**item)).count() as u32
    }

    pub fn missing(&self) -> Vec<PpeItem> {
        PpeItem::ALL
            .iter()
            .copied()
            .filter(|item| !self.get(*item))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSample {
    pub id: String,
    pub file_name: String,
    /// Base64 payload without the data-URI prefix.
    pub image_data: String,
    pub image_url: String,
    pub labels: PpeLabels,
    #[serde(rename = "uploadDate")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_session_id: Option<String>,
    #[serde(rename = "isUsedForPrediction")]
    pub used_for_prediction: bool,
    pub quality: Quality,
    pub confidence: f64,
}
