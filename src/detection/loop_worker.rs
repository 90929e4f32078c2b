use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::db::SavedPhoto;

use super::frame::FrameSource;
use super::pipeline::DetectionPipeline;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    pub interval: Duration,
    pub cycle_timeout: Duration,
}

pub async fn detection_loop(
    source: Arc<dyn FrameSource>,
    pipeline: Arc<DetectionPipeline>,
    timing: LoopTiming,
    results_tx: watch::Sender<Option<SavedPhoto>>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(timing.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let cycle = run_cycle(source.as_ref(), pipeline.as_ref());
                match tokio::time::timeout(timing.cycle_timeout, cycle).await {
                    Ok(Ok(Some(photo))) => {
                        let _ = results_tx.send(Some(photo));
                    }
                    Ok(Ok(None)) => {}
                    Ok(Err(err)) => log_error!("detection cycle failed: {err:?}"),
                    Err(_) => log_warn!("detection cycle timeout (> {:?})", timing.cycle_timeout),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("detection loop shutting down");
                break;
            }
        }
    }
}

async fn run_cycle(
    source: &dyn FrameSource,
    pipeline: &DetectionPipeline,
) -> anyhow::Result<Option<SavedPhoto>> {
    let cycle_start = Instant::now();

    let Some(frame) = source.capture().await? else {
        log_info!("no frame available this cycle");
        return Ok(None);
    };
    let frame_len = frame.len();

    let photo = pipeline.analyze_frame(&frame).await?;
    if photo.is_some() {
        log_info!(
            "detection cycle completed in {}ms ({} byte frame)",
            cycle_start.elapsed().as_millis(),
            frame_len
        );
    }
    Ok(photo)
}
