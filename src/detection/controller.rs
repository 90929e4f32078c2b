use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::db::SavedPhoto;

use super::frame::FrameSource;
use super::loop_worker::{detection_loop, LoopTiming};
use super::pipeline::DetectionPipeline;

pub const DEFAULT_INTERVAL_SECS: u64 = 4;
pub const DEFAULT_CYCLE_TIMEOUT_SECS: u64 = 30;

/// Starts and stops the periodic detection loop. At most one loop runs per
/// controller.
pub struct DetectionController {
    timing: LoopTiming,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl DetectionController {
    pub fn new(interval: Duration, cycle_timeout: Duration) -> Self {
        Self {
            timing: LoopTiming {
                interval,
                cycle_timeout,
            },
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawns the loop. The returned receiver holds the most recent saved
    /// photo, starting at `None`.
    pub fn start(
        &mut self,
        source: Arc<dyn FrameSource>,
        pipeline: Arc<DetectionPipeline>,
    ) -> Result<watch::Receiver<Option<SavedPhoto>>> {
        if self.handle.is_some() {
            bail!("detection already active");
        }

        let cancel_token = CancellationToken::new();
        let (results_tx, results_rx) = watch::channel(None);

        info!(
            "starting detection loop (interval {:?}, timeout {:?})",
            self.timing.interval, self.timing.cycle_timeout
        );
        let handle = tokio::spawn(detection_loop(
            source,
            pipeline,
            self.timing,
            results_tx,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(results_rx)
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("detection loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for DetectionController {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_INTERVAL_SECS),
            Duration::from_secs(DEFAULT_CYCLE_TIMEOUT_SECS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    use crate::db::Database;
    use crate::detection::detector::FixedDetector;
    use crate::detection::photos::PhotoHistory;
    use crate::detection::pipeline::tests::{base_result, pipeline_with};

    struct StaticFrame(Vec<u8>);

    #[async_trait]
    impl FrameSource for StaticFrame {
        async fn capture(&self) -> Result<Option<Vec<u8>>> {
            Ok(Some(self.0.clone()))
        }
    }

    struct NoFrame;

    #[async_trait]
    impl FrameSource for NoFrame {
        async fn capture(&self) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
    }

    fn fast_controller() -> DetectionController {
        DetectionController::new(Duration::from_millis(20), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn publishes_results_until_stopped() {
        let db = Database::in_memory().unwrap();
        let pipeline = Arc::new(pipeline_with(&db, Arc::new(FixedDetector::new(base_result(82.0)))));
        let mut controller = fast_controller();

        let mut results = controller
            .start(Arc::new(StaticFrame(vec![7, 7, 7])), pipeline.clone())
            .unwrap();
        assert!(controller.is_running());

        tokio::time::timeout(Duration::from_secs(5), results.changed())
            .await
            .unwrap()
            .unwrap();
        let latest = results.borrow().clone().unwrap();
        assert_eq!(latest.detection_result.confidence(), 82.0);

        controller.stop().await.unwrap();
        assert!(!controller.is_running());

        let stored = PhotoHistory::new(db.clone()).all().await.unwrap().len();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(PhotoHistory::new(db).all().await.unwrap().len(), stored);
    }

    #[tokio::test]
    async fn rejects_second_start() {
        let db = Database::in_memory().unwrap();
        let pipeline = Arc::new(pipeline_with(&db, Arc::new(FixedDetector::new(base_result(82.0)))));
        let mut controller = fast_controller();

        controller.start(Arc::new(NoFrame), pipeline.clone()).unwrap();
        assert!(controller.start(Arc::new(NoFrame), pipeline).is_err());
        controller.stop().await.unwrap();
        // Stopping twice is a no-op.
        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn empty_source_saves_nothing() {
        let db = Database::in_memory().unwrap();
        let pipeline = Arc::new(pipeline_with(&db, Arc::new(FixedDetector::new(base_result(82.0)))));
        let mut controller = fast_controller();

        let results = controller.start(Arc::new(NoFrame), pipeline).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.stop().await.unwrap();

        assert!(results.borrow().is_none());
        assert!(PhotoHistory::new(db).all().await.unwrap().is_empty());
    }
}
