//! Simulated training run: a fixed sequence of steps that ends by storing
//! the labeled uploads and recording a session in the ledger.

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::{CurrentModel, Database, PpeLabels, SessionStatus, TrainingSample, TrainingSession};
use crate::detection::Scorer;

use super::folders::insert_samples;
use super::ledger::append_session;
use super::upload::ImageUpload;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const TRAINING_STEPS: [&str; 6] = [
    "Analyzing image features",
    "Training neural network",
    "Optimizing weights",
    "Validating model",
    "Saving trained model",
    "Training completed",
];
pub const TRAINING_EPOCHS: u32 = 50;
pub const DEFAULT_STEP_DELAY_MS: u64 = 1500;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingProgress {
    /// Steps finished so far.
    pub completed_steps: usize,
    pub total_steps: usize,
    pub current_step: Option<String>,
}

impl TrainingProgress {
    pub fn percent(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        self.completed_steps as f64 / self.total_steps as f64 * 100.0
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOutput {
    pub session: TrainingSession,
    pub model: CurrentModel,
}

pub struct TrainingRunner {
    db: Database,
    scorer: Arc<dyn Scorer>,
    step_delay: Duration,
    progress_tx: watch::Sender<TrainingProgress>,
}

impl TrainingRunner {
    pub fn new(db: Database, scorer: Arc<dyn Scorer>, step_delay: Duration) -> Self {
        let (progress_tx, _) = watch::channel(TrainingProgress::default());
        Self {
            db,
            scorer,
            step_delay,
            progress_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TrainingProgress> {
        self.progress_tx.subscribe()
    }

    /// Runs every step, then stores the samples and the session in one
    /// transaction. Returns `None` when `cancel` fires before the last step
    /// finishes, in which case nothing is stored.
    pub async fn run(
        &self,
        uploads: Vec<(ImageUpload, PpeLabels)>,
        folder_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<TrainingOutput>> {
        if uploads.is_empty() {
            bail!("no labeled images to train on");
        }

        let total_steps = TRAINING_STEPS.len();
        for (index, step) in TRAINING_STEPS.iter().enumerate() {
            if cancel.is_cancelled() {
                log_warn!("training cancelled before step {}", step);
                return Ok(None);
            }
            self.progress_tx.send_replace(TrainingProgress {
                completed_steps: index,
                total_steps,
                current_step: Some(step.to_string()),
            });
            log_info!("training step {}/{}: {}", index + 1, total_steps, step);

            tokio::select! {
                _ = tokio::time::sleep(self.step_delay) => {}
                _ = cancel.cancelled() => {
                    log_warn!("training cancelled during step {}", step);
                    return Ok(None);
                }
            }
        }
        self.progress_tx.send_replace(TrainingProgress {
            completed_steps: total_steps,
            total_steps,
            current_step: None,
        });

        let total_images = uploads.len() as u64;
        let outcome = self.scorer.training_outcome(total_images);
        let now = Utc::now();
        let session = TrainingSession {
            id: Uuid::new_v4().to_string(),
            timestamp: now,
            total_images,
            accuracy: outcome.accuracy,
            model_version: format!("v{}", now.timestamp_millis()),
            epochs: TRAINING_EPOCHS,
            validation_loss: outcome.validation_loss,
            training_time: outcome.training_time_secs,
            status: SessionStatus::Completed,
        };

        let samples: Vec<TrainingSample> = uploads
            .into_iter()
            .map(|(upload, labels)| upload.into_sample(labels, Some(session.id.clone()), now))
            .collect();
        let folder_id = folder_id.map(str::to_string);
        let recorded = session.clone();
        let model = self
            .db
            .execute(move |conn| {
                let tx = conn.transaction()?;
                insert_samples(&tx, &samples, folder_id.as_deref())?;
                let model = append_session(&tx, &recorded)?;
                tx.commit()?;
                Ok(model)
            })
            .await?;

        log_info!(
            "training finished: {} images, accuracy {:.2}%, model {}",
            total_images,
            session.accuracy,
            model.version
        );
        Ok(Some(TrainingOutput { session, model }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::FixedScorer;
    use crate::training::{TrainingFolderStore, TrainingSessionLedger};

    fn runner(db: &Database, step_delay: Duration) -> TrainingRunner {
        TrainingRunner::new(db.clone(), Arc::new(FixedScorer::default()), step_delay)
    }

    fn uploads(count: usize) -> Vec<(ImageUpload, PpeLabels)> {
        (0..count)
            .map(|index| {
                (
                    ImageUpload::from_bytes(format!("img-{index}.jpg"), vec![0xFF, 0xD8]),
                    PpeLabels {
                        has_helmet: true,
                        ..PpeLabels::default()
                    },
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn rejects_empty_batch() {
        let db = Database::in_memory().unwrap();
        let result = runner(&db, Duration::ZERO)
            .run(Vec::new(), None, &CancellationToken::new())
            .await;
        assert!(result.is_err());
        assert!(TrainingSessionLedger::new(db).sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn completed_run_stores_samples_and_session() {
        let db = Database::in_memory().unwrap();
        let runner = runner(&db, Duration::ZERO);
        let progress = runner.subscribe();

        let output = runner
            .run(uploads(3), None, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(output.session.total_images, 3);
        assert_eq!(output.session.epochs, TRAINING_EPOCHS);
        assert_eq!(output.session.accuracy, 96.0);
        assert_eq!(output.session.status, SessionStatus::Completed);
        assert!(output.session.model_version.starts_with('v'));
        assert_eq!(output.model.version, output.session.model_version);
        assert_eq!(output.model.trained_images, 3);

        let folders = TrainingFolderStore::new(db.clone()).get_all_folders().await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].total_images, 3);
        assert!(folders[0]
            .images
            .iter()
            .all(|sample| sample.training_session_id.as_deref() == Some(output.session.id.as_str())));

        let sessions = TrainingSessionLedger::new(db).sessions().await.unwrap();
        assert_eq!(sessions, vec![output.session]);

        let last = progress.borrow().clone();
        assert_eq!(last.completed_steps, TRAINING_STEPS.len());
        assert_eq!(last.percent(), 100.0);
    }

    #[tokio::test]
    async fn cancellation_persists_nothing() {
        let db = Database::in_memory().unwrap();
        let runner = runner(&db, Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = runner.run(uploads(2), None, &cancel).await.unwrap();
        assert!(result.is_none());
        assert!(TrainingFolderStore::new(db.clone()).get_all_folders().await.unwrap().is_empty());
        assert!(TrainingSessionLedger::new(db).sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_folder_fails_without_recording_session() {
        let db = Database::in_memory().unwrap();
        let result = runner(&db, Duration::ZERO)
            .run(uploads(1), Some("missing"), &CancellationToken::new())
            .await;
        assert!(result.is_err());
        assert!(TrainingSessionLedger::new(db).sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_session_write_rolls_back_samples() {
        let db = Database::in_memory().unwrap();
        db.execute(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_sessions BEFORE INSERT ON kv_store
                 WHEN NEW.key = 'neural_training_sessions'
                 BEGIN SELECT RAISE(ABORT, 'session storage unavailable'); END;",
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let result = runner(&db, Duration::ZERO)
            .run(uploads(1), None, &CancellationToken::new())
            .await;

        assert!(result.is_err());
        let folders = TrainingFolderStore::new(db.clone()).get_all_folders().await.unwrap();
        assert!(folders.is_empty());
        assert!(TrainingSessionLedger::new(db).sessions().await.unwrap().is_empty());
    }
}
