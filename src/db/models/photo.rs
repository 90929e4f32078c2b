use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EnhancedDetectionResult;

/// A captured frame kept in the detection history together with its result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedPhoto {
    pub id: String,
    pub image_url: String,
    pub timestamp: DateTime<Utc>,
    pub detection_result: EnhancedDetectionResult,
    pub filename: String,
}
