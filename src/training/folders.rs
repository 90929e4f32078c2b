use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{helpers, keys, Database, PpeLabels, TrainingFolder, TrainingSample};

use super::upload::ImageUpload;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Reserved name of the folder used when a sample is saved without a target.
pub const DEFAULT_FOLDER_NAME: &str = "Entrenamiento General";
pub const DEFAULT_FOLDER_DESCRIPTION: &str = "Main folder for PPE training images";

pub(crate) fn load_folders(conn: &Connection) -> Result<Vec<TrainingFolder>> {
    helpers::read_json_or_default(conn, keys::TRAINING_FOLDERS)
}

fn store_folders(conn: &Connection, folders: &[TrainingFolder]) -> Result<()> {
    helpers::write_json(conn, keys::TRAINING_FOLDERS, folders)
}

fn push_new_folder(folders: &mut Vec<TrainingFolder>, name: String, description: String) -> TrainingFolder {
    let folder = TrainingFolder::new(Uuid::new_v4().to_string(), name, description, Utc::now());
    folders.push(folder.clone());
    folder
}

/// Index of the target folder, creating the default folder when no id is given.
fn resolve_target(folders: &mut Vec<TrainingFolder>, folder_id: Option<&str>) -> Result<usize> {
    match folder_id {
        Some(id) => folders
            .iter()
            .position(|folder| folder.id == id)
            .ok_or_else(|| anyhow!("training folder {id} not found")),
        None => {
            if let Some(index) = folders
                .iter()
                .position(|folder| folder.name == DEFAULT_FOLDER_NAME)
            {
                return Ok(index);
            }
            push_new_folder(
                folders,
                DEFAULT_FOLDER_NAME.to_string(),
                DEFAULT_FOLDER_DESCRIPTION.to_string(),
            );
            Ok(folders.len() - 1)
        }
    }
}

/// Appends `samples` to the target folder (default folder when `folder_id` is
/// `None`) and rewrites the collection. Returns the folder's name.
pub(crate) fn insert_samples(
    conn: &Connection,
    samples: &[TrainingSample],
    folder_id: Option<&str>,
) -> Result<String> {
    let mut folders = load_folders(conn)?;
    let index = resolve_target(&mut folders, folder_id)?;
    let folder = &mut folders[index];
    folder.images.extend(samples.iter().cloned());
    folder.recompute_aggregates();
    let folder_name = folder.name.clone();
    store_folders(conn, &folders)?;
    Ok(folder_name)
}

/// CRUD over training folders. Every mutation rewrites the whole collection
/// and refreshes the aggregates of the folder it touched.
#[derive(Clone)]
pub struct TrainingFolderStore {
    db: Database,
}

impl TrainingFolderStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create_folder(&self, name: &str, description: &str) -> Result<TrainingFolder> {
        let name = name.to_string();
        let description = description.to_string();
        self.db
            .execute(move |conn| {
                let mut folders = load_folders(conn)?;
                let folder = push_new_folder(&mut folders, name, description);
                store_folders(conn, &folders)?;
                log_info!("Training folder created: {} ({})", folder.name, folder.id);
                Ok(folder)
            })
            .await
    }

    pub async fn get_all_folders(&self) -> Result<Vec<TrainingFolder>> {
        self.db.execute(|conn| load_folders(conn)).await
    }

    pub async fn get_folder(&self, folder_id: &str) -> Result<Option<TrainingFolder>> {
        let folder_id = folder_id.to_string();
        self.db
            .execute(move |conn| {
                Ok(load_folders(conn)?
                    .into_iter()
                    .find(|folder| folder.id == folder_id))
            })
            .await
    }

    pub async fn find_default_folder(&self) -> Result<Option<TrainingFolder>> {
        self.db
            .execute(|conn| {
                Ok(load_folders(conn)?
                    .into_iter()
                    .find(|folder| folder.name == DEFAULT_FOLDER_NAME))
            })
            .await
    }

    /// Creates the default folder. Fails if one already exists, so at most one
    /// folder ever carries the reserved name.
    pub async fn create_default_folder(&self) -> Result<TrainingFolder> {
        self.db
            .execute(|conn| {
                let mut folders = load_folders(conn)?;
                if folders.iter().any(|folder| folder.name == DEFAULT_FOLDER_NAME) {
                    bail!("default training folder already exists");
                }
                let folder = push_new_folder(
                    &mut folders,
                    DEFAULT_FOLDER_NAME.to_string(),
                    DEFAULT_FOLDER_DESCRIPTION.to_string(),
                );
                store_folders(conn, &folders)?;
                log_info!("Default training folder created");
                Ok(folder)
            })
            .await
    }

    /// Lookup and creation happen in one database task, so concurrent callers
    /// still end up with a single default folder.
    pub async fn get_or_create_default_folder(&self) -> Result<TrainingFolder> {
        self.db
            .execute(|conn| {
                let mut folders = load_folders(conn)?;
                let before = folders.len();
                let index = resolve_target(&mut folders, None)?;
                if folders.len() != before {
                    store_folders(conn, &folders)?;
                    log_info!("Default training folder created");
                }
                Ok(folders[index].clone())
            })
            .await
    }

    /// Appends `sample` to the folder. Unlike reads, an unknown folder id is
    /// reported as an error so the sample is not silently lost.
    pub async fn add_sample(&self, folder_id: &str, sample: TrainingSample) -> Result<TrainingFolder> {
        let folder_id = folder_id.to_string();
        self.db
            .execute(move |conn| {
                let mut folders = load_folders(conn)?;
                let index = resolve_target(&mut folders, Some(&folder_id))?;
                let folder = &mut folders[index];
                folder.images.push(sample);
                folder.recompute_aggregates();
                let updated = folder.clone();
                store_folders(conn, &folders)?;
                log_info!("Sample added to folder {}", updated.name);
                Ok(updated)
            })
            .await
    }

    pub async fn save_sample(
        &self,
        upload: ImageUpload,
        labels: PpeLabels,
        folder_id: Option<&str>,
        training_session_id: Option<&str>,
    ) -> Result<TrainingSample> {
        let mut saved = self
            .save_samples(vec![(upload, labels)], folder_id, training_session_id)
            .await?;
        saved
            .pop()
            .ok_or_else(|| anyhow!("sample was not saved"))
    }

    /// Builds samples from uploads and stores them in one write. Without a
    /// folder id the default folder is used, and created if needed.
    pub async fn save_samples(
        &self,
        uploads: Vec<(ImageUpload, PpeLabels)>,
        folder_id: Option<&str>,
        training_session_id: Option<&str>,
    ) -> Result<Vec<TrainingSample>> {
        let uploaded_at = Utc::now();
        let session_id = training_session_id.map(str::to_string);
        let samples: Vec<TrainingSample> = uploads
            .into_iter()
            .map(|(upload, labels)| upload.into_sample(labels, session_id.clone(), uploaded_at))
            .collect();
        let folder_id = folder_id.map(str::to_string);

        self.db
            .execute(move |conn| {
                let folder_name = insert_samples(conn, &samples, folder_id.as_deref())?;
                log_info!("{} training sample(s) saved to {}", samples.len(), folder_name);
                Ok(samples)
            })
            .await
    }

    /// Removes the first sample with `sample_id`. Returns whether one was found.
    pub async fn delete_sample(&self, sample_id: &str) -> Result<bool> {
        let sample_id = sample_id.to_string();
        self.db
            .execute(move |conn| {
                let mut folders = load_folders(conn)?;
                let mut removed = false;
                for folder in folders.iter_mut() {
                    if let Some(position) = folder.images.iter().position(|image| image.id == sample_id) {
                        folder.images.remove(position);
                        folder.recompute_aggregates();
                        removed = true;
                        break;
                    }
                }
                if removed {
                    store_folders(conn, &folders)?;
                    log_info!("Training sample deleted: {sample_id}");
                }
                Ok(removed)
            })
            .await
    }

    /// Removes the folder together with every sample it owns.
    pub async fn delete_folder(&self, folder_id: &str) -> Result<bool> {
        let folder_id = folder_id.to_string();
        self.db
            .execute(move |conn| {
                let mut folders = load_folders(conn)?;
                let before = folders.len();
                folders.retain(|folder| folder.id != folder_id);
                let removed = folders.len() != before;
                if removed {
                    store_folders(conn, &folders)?;
                    log_info!("Training folder deleted: {folder_id}");
                }
                Ok(removed)
            })
            .await
    }

    pub async fn clear(&self) -> Result<()> {
        self.db.remove_keys(&[keys::TRAINING_FOLDERS]).await?;
        log_info!("All training folders removed");
        Ok(())
    }
}
