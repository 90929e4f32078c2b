//! Derivations applied once when a sample is created.

use crate::db::{PpeLabels, Quality};

/// Uploads strictly larger than this are `High`.
pub const HIGH_QUALITY_MIN_BYTES: u64 = 2 * 1024 * 1024;
/// Uploads strictly larger than this (and not `High`) are `Medium`.
pub const MEDIUM_QUALITY_MIN_BYTES: u64 = 512 * 1024;

const BASE_CONFIDENCE: f64 = 70.0;
const CONFIDENCE_PER_LABEL: f64 = 5.0;
const MAX_CONFIDENCE: f64 = 95.0;

/// Coarse quality tier from the declared file size.
pub fn classify(file_size_bytes: u64) -> Quality {
    if file_size_bytes > HIGH_QUALITY_MIN_BYTES {
        Quality::High
    } else if file_size_bytes > MEDIUM_QUALITY_MIN_BYTES {
        Quality::Medium
    } else {
        Quality::Low
    }
}

/// Label-completeness confidence: 70 plus 5 per present item, capped at 95.
pub fn estimate_confidence(labels: &PpeLabels) -> f64 {
    let present = f64::from(labels.count_true());
    (BASE_CONFIDENCE + CONFIDENCE_PER_LABEL * present).min(MAX_CONFIDENCE)
}
