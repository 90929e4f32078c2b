use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Source of frames for the detection loop. `None` means no frame is
/// available this cycle.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self) -> Result<Option<Vec<u8>>>;
}

/// Re-reads an image file on every capture, so an external process can keep
/// overwriting it with the latest camera frame.
#[derive(Debug, Clone)]
pub struct FileFrameSource {
    path: PathBuf,
}

impl FileFrameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FrameSource for FileFrameSource {
    async fn capture(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read frame {}", self.path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_or_empty_file_yields_no_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        let source = FileFrameSource::new(&path);

        assert!(source.capture().await.unwrap().is_none());

        std::fs::write(&path, b"").unwrap();
        assert!(source.capture().await.unwrap().is_none());

        std::fs::write(&path, [0xFF, 0xD8, 0xFF]).unwrap();
        assert_eq!(source.capture().await.unwrap(), Some(vec![0xFF, 0xD8, 0xFF]));
    }
}
