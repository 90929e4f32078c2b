use std::path::Path;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{PpeLabels, TrainingSample};

use super::quality::{classify, estimate_confidence};

const FALLBACK_MIME: &str = "application/octet-stream";

/// A file handed in by the user: raw bytes plus what the caller declared
/// about it. Content is not validated beyond sniffing a MIME type.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub declared_size: u64,
    pub mime_type: Option<String>,
}

impl ImageUpload {
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let declared_size = bytes.len() as u64;
        Self {
            file_name: file_name.into(),
            bytes,
            declared_size,
            mime_type: None,
        }
    }

    /// Overrides the size used for quality classification.
    pub fn with_declared_size(mut self, declared_size: u64) -> Self {
        self.declared_size = declared_size;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read image file {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_bytes(file_name, bytes))
    }

    pub fn resolved_mime_type(&self) -> String {
        if let Some(mime) = &self.mime_type {
            return mime.clone();
        }
        image::guess_format(&self.bytes)
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|_| FALLBACK_MIME.to_string())
    }

    pub fn base64_payload(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn into_sample(
        self,
        labels: PpeLabels,
        training_session_id: Option<String>,
        uploaded_at: DateTime<Utc>,
    ) -> TrainingSample {
        let payload = self.base64_payload();
        let image_url = format!("data:{};base64,{}", self.resolved_mime_type(), payload);

        TrainingSample {
            id: Uuid::new_v4().to_string(),
            file_name: self.file_name,
            image_data: payload,
            image_url,
            labels,
            uploaded_at,
            training_session_id,
            used_for_prediction: true,
            quality: classify(self.declared_size),
            confidence: estimate_confidence(&labels),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Quality;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn sniffs_png_for_data_uri() {
        let upload = ImageUpload::from_bytes("frame.png", PNG_SIGNATURE.to_vec());
        let sample = upload.into_sample(PpeLabels::default(), None, Utc::now());

        assert!(sample.image_url.starts_with("data:image/png;base64,"));
        assert!(sample.image_url.ends_with(&sample.image_data));
        assert_eq!(STANDARD.decode(&sample.image_data).unwrap(), PNG_SIGNATURE);
    }

    #[test]
    fn unknown_bytes_fall_back_to_octet_stream() {
        let upload = ImageUpload::from_bytes("blob.bin", vec![1, 2, 3]);
        assert_eq!(upload.resolved_mime_type(), FALLBACK_MIME);

        let declared = upload.with_mime_type("image/jpeg");
        assert_eq!(declared.resolved_mime_type(), "image/jpeg");
    }

    #[test]
    fn derivations_use_declared_size_and_labels() {
        let labels = PpeLabels {
            has_helmet: true,
            has_gloves: true,
            ..PpeLabels::default()
        };
        let sample = ImageUpload::from_bytes("a.jpg", vec![0; 16])
            .with_declared_size(3 * 1024 * 1024)
            .into_sample(labels, Some("session-1".into()), Utc::now());

        assert_eq!(sample.quality, Quality::High);
        assert_eq!(sample.confidence, 80.0);
        assert!(sample.used_for_prediction);
        assert_eq!(sample.training_session_id.as_deref(), Some("session-1"));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ImageUpload::from_path(&dir.path().join("absent.jpg")).await;
        assert!(result.is_err());
    }
}
