use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{helpers, keys, CurrentModel, Database, SessionStatus, TrainingSession};

use super::folders::load_folders;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Sessions kept in the history; older ones are dropped from the tail.
pub const SESSION_HISTORY_CAP: usize = 20;
pub const RETRAIN_AFTER_DAYS: i64 = 7;
pub const MIN_TRAINING_IMAGES: u64 = 50;
const EVOLUTION_POINTS: usize = 5;

pub(crate) fn load_sessions(conn: &Connection) -> Result<Vec<TrainingSession>> {
    helpers::read_json_or_default(conn, keys::TRAINING_SESSIONS)
}

/// Current model descriptor, persisting the initial one on first access.
pub(crate) fn load_or_init_model(conn: &Connection, now: DateTime<Utc>) -> Result<CurrentModel> {
    if let Some(model) = helpers::read_json(conn, keys::CURRENT_MODEL)? {
        return Ok(model);
    }
    let model = CurrentModel::initial(now);
    helpers::write_json(conn, keys::CURRENT_MODEL, &model)?;
    Ok(model)
}

pub(crate) fn stored_sample_count(conn: &Connection) -> Result<u64> {
    Ok(load_folders(conn)?
        .iter()
        .map(|folder| folder.images.len() as u64)
        .sum())
}

/// Prepends `session`, trims the history and folds it into the current
/// model. Callers wrap this in a transaction.
pub(crate) fn append_session(conn: &Connection, session: &TrainingSession) -> Result<CurrentModel> {
    let mut sessions = load_sessions(conn)?;
    sessions.insert(0, session.clone());
    sessions.truncate(SESSION_HISTORY_CAP);
    helpers::write_json(conn, keys::TRAINING_SESSIONS, &sessions)?;

    let current: Option<CurrentModel> = helpers::read_json(conn, keys::CURRENT_MODEL)?;
    let model = current
        .unwrap_or_else(|| CurrentModel::blank(Utc::now()))
        .absorb(session);
    helpers::write_json(conn, keys::CURRENT_MODEL, &model)?;
    Ok(model)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelEvolutionPoint {
    pub version: String,
    pub accuracy: f64,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub total_sessions: usize,
    pub completed_sessions: usize,
    /// Seconds, rounded.
    pub total_training_time: f64,
    pub average_accuracy: f64,
    pub current_model: CurrentModel,
    pub last_training: Option<DateTime<Utc>>,
    /// Model trained images plus stored samples; the two counters are summed
    /// as-is even when they describe the same uploads.
    pub total_images_processed: u64,
    pub model_evolution: Vec<ModelEvolutionPoint>,
}

pub fn compute_ledger_stats(
    sessions: &[TrainingSession],
    model: CurrentModel,
    stored_samples: u64,
) -> LedgerStats {
    let completed: Vec<&TrainingSession> = sessions
        .iter()
        .filter(|session| session.status == SessionStatus::Completed)
        .collect();
    let total_training_time: f64 = completed.iter().map(|session| session.training_time).sum();
    let average_accuracy = if completed.is_empty() {
        0.0
    } else {
        completed.iter().map(|session| session.accuracy).sum::<f64>() / completed.len() as f64
    };

    LedgerStats {
        total_sessions: sessions.len(),
        completed_sessions: completed.len(),
        total_training_time: total_training_time.round(),
        average_accuracy: round2(average_accuracy),
        total_images_processed: model.trained_images + stored_samples,
        current_model: model,
        last_training: sessions.first().map(|session| session.timestamp),
        model_evolution: sessions
            .iter()
            .take(EVOLUTION_POINTS)
            .map(|session| ModelEvolutionPoint {
                version: session.model_version.clone(),
                accuracy: session.accuracy,
                date: session.timestamp,
            })
            .collect(),
    }
}

pub fn needs_retraining(model: &CurrentModel, stored_samples: u64, now: DateTime<Utc>) -> bool {
    let stale = now - model.last_training > Duration::days(RETRAIN_AFTER_DAYS);
    stale || model.trained_images + stored_samples < MIN_TRAINING_IMAGES
}

/// Accuracy a detection would reach after training on `extra_images` more
/// samples, capped at 99 and rounded to two decimals.
pub fn improved_accuracy(model: &CurrentModel, base_accuracy: f64, extra_images: u64) -> f64 {
    let seen = (model.trained_images + extra_images) as f64;
    let factor = (seen / 1000.0 * 0.1).min(0.15);
    round2((base_accuracy + factor * 100.0).min(99.0))
}

pub fn recommendations(model: &CurrentModel, retrain: bool) -> Vec<String> {
    let mut advice = Vec::new();

    if model.trained_images < MIN_TRAINING_IMAGES {
        advice.push("Add more training images to improve accuracy".to_string());
    }
    if model.accuracy < 90.0 {
        advice.push("The model needs more training to reach high accuracy".to_string());
    }
    if retrain {
        advice.push("Consider retraining the model with more recent data".to_string());
    }
    if model.trained_images > 100 && model.accuracy > 95.0 {
        advice.push("The model is well trained and ready for production use".to_string());
    }

    if advice.is_empty() {
        advice.push("The model is working correctly".to_string());
    }
    advice
}

/// Append-only history of training sessions and the model they fold into.
#[derive(Clone)]
pub struct TrainingSessionLedger {
    db: Database,
}

impl TrainingSessionLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Prepends the session, trims the history and folds it into the current
    /// model inside one transaction. With no persisted model yet, the fold
    /// starts from a blank descriptor rather than the initial 85% one.
    pub async fn record_session(&self, session: TrainingSession) -> Result<CurrentModel> {
        self.db
            .execute(move |conn| {
                let tx = conn.transaction()?;
                let model = append_session(&tx, &session)?;
                tx.commit()?;
                log_info!(
                    "Training session {} recorded; model now {} ({:.2}%)",
                    session.id,
                    model.version,
                    model.accuracy
                );
                Ok(model)
            })
            .await
    }

    /// Newest first.
    pub async fn sessions(&self) -> Result<Vec<TrainingSession>> {
        self.db.execute(|conn| load_sessions(conn)).await
    }

    pub async fn current_model(&self) -> Result<CurrentModel> {
        self.db
            .execute(|conn| load_or_init_model(conn, Utc::now()))
            .await
    }

    pub async fn stats(&self) -> Result<LedgerStats> {
        self.db
            .execute(|conn| {
                let sessions = load_sessions(conn)?;
                let model = load_or_init_model(conn, Utc::now())?;
                let stored = stored_sample_count(conn)?;
                Ok(compute_ledger_stats(&sessions, model, stored))
            })
            .await
    }

    pub async fn needs_retraining(&self) -> Result<bool> {
        self.needs_retraining_at(Utc::now()).await
    }

    pub async fn needs_retraining_at(&self, now: DateTime<Utc>) -> Result<bool> {
        self.db
            .execute(move |conn| {
                let model = load_or_init_model(conn, now)?;
                let stored = stored_sample_count(conn)?;
                Ok(needs_retraining(&model, stored, now))
            })
            .await
    }

    pub async fn improved_accuracy(&self, base_accuracy: f64, extra_images: u64) -> Result<f64> {
        let model = self.current_model().await?;
        Ok(improved_accuracy(&model, base_accuracy, extra_images))
    }

    pub async fn recommendations(&self) -> Result<Vec<String>> {
        self.db
            .execute(|conn| {
                let now = Utc::now();
                let model = load_or_init_model(conn, now)?;
                let stored = stored_sample_count(conn)?;
                let retrain = needs_retraining(&model, stored, now);
                Ok(recommendations(&model, retrain))
            })
            .await
    }

    /// Drops the history and resets the model to its initial state on next read.
    pub async fn clear(&self) -> Result<()> {
        self.db
            .remove_keys(&[keys::TRAINING_SESSIONS, keys::CURRENT_MODEL])
            .await?;
        log_info!("Training sessions and model cleared");
        Ok(())
    }
}
