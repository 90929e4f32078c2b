use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use uuid::Uuid;

use crate::db::{helpers, keys, Database, EnhancedDetectionResult, SavedPhoto};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

pub const DEFAULT_PHOTO_HISTORY_CAP: usize = 50;

/// `PPE_<dd-mm-yyyy>_<HH-MM-SS>.jpg` in local time.
pub fn photo_filename(timestamp: DateTime<Utc>) -> String {
    let local = timestamp.with_timezone(&Local);
    format!(
        "PPE_{}_{}.jpg",
        local.format("%d-%m-%Y"),
        local.format("%H-%M-%S")
    )
}

/// Bounded history of analysed frames, newest last.
#[derive(Clone)]
pub struct PhotoHistory {
    db: Database,
    cap: usize,
}

impl PhotoHistory {
    pub fn new(db: Database) -> Self {
        Self::with_cap(db, DEFAULT_PHOTO_HISTORY_CAP)
    }

    pub fn with_cap(db: Database, cap: usize) -> Self {
        Self { db, cap: cap.max(1) }
    }

    pub async fn save(&self, image_base64: &str, result: EnhancedDetectionResult) -> Result<SavedPhoto> {
        let timestamp = Utc::now();
        let photo = SavedPhoto {
            id: Uuid::new_v4().to_string(),
            image_url: format!("data:image/jpeg;base64,{image_base64}"),
            timestamp,
            detection_result: result,
            filename: photo_filename(timestamp),
        };

        let cap = self.cap;
        let stored = photo.clone();
        let kept = self
            .db
            .execute(move |conn| {
                let mut photos: Vec<SavedPhoto> =
                    helpers::read_json_or_default(conn, keys::DETECTION_PHOTOS)?;
                photos.push(stored);
                if photos.len() > cap {
                    let overflow = photos.len() - cap;
                    photos.drain(..overflow);
                }
                helpers::write_json(conn, keys::DETECTION_PHOTOS, &photos)?;
                Ok(photos.len())
            })
            .await?;

        log_info!("saved detection photo {} ({} in history)", photo.filename, kept);
        Ok(photo)
    }

    pub async fn all(&self) -> Result<Vec<SavedPhoto>> {
        self.db
            .execute(|conn| helpers::read_json_or_default(conn, keys::DETECTION_PHOTOS))
            .await
    }

    pub async fn delete(&self, photo_id: &str) -> Result<bool> {
        let photo_id = photo_id.to_string();
        self.db
            .execute(move |conn| {
                let mut photos: Vec<SavedPhoto> =
                    helpers::read_json_or_default(conn, keys::DETECTION_PHOTOS)?;
                let before = photos.len();
                photos.retain(|photo| photo.id != photo_id);
                if photos.len() == before {
                    return Ok(false);
                }
                helpers::write_json(conn, keys::DETECTION_PHOTOS, &photos)?;
                Ok(true)
            })
            .await
    }

    pub async fn clear(&self) -> Result<()> {
        self.db
            .execute(|conn| {
                helpers::remove_key(conn, keys::DETECTION_PHOTOS)?;
                Ok(())
            })
            .await
    }
}
