// Supervised detection loop: one detection cycle at a time, stamped and cancellable

use crate::camera::FrameReceiver;
use crate::config::AppConfig;
use crate::loader::SharedAnalyzer;
use crate::models::{resize_results, DisplaySize, EmotionReading, FaceDetection, Frame};
use crate::overlay::Overlay;
use crate::state::{Rejection, TickOutcome, TickStamp, ViewState};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Handle of a running detection loop
pub struct DetectionTask {
    handle: JoinHandle<()>,
}

impl DetectionTask {
    /// Cancels the loop, dropping any in-flight detection result
    pub fn cancel(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Settings of the polling loop
#[derive(Clone, Copy, Debug)]
pub struct DetectionLoop {
    pub interval: Duration,
    pub display: DisplaySize,
    pub min_confidence: f32,
}

impl DetectionLoop {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            display: config.display_size(),
            min_confidence: config.expression_min_confidence,
        }
    }

    /// Starts polling `frames` for `session`
    pub fn spawn(
        self,
        runtime: &Handle,
        session: u64,
        frames: FrameReceiver,
        analyzer: SharedAnalyzer,
        state: Arc<Mutex<ViewState>>,
    ) -> DetectionTask {
        let handle = runtime.spawn(self.run(session, frames, analyzer, state));
        DetectionTask { handle }
    }

    async fn run(
        self,
        session: u64,
        mut frames: FrameReceiver,
        analyzer: SharedAnalyzer,
        state: Arc<Mutex<ViewState>>,
    ) {
        // Playback starts with the first frame
        if frames.wait_for(|frame| frame.is_some()).await.is_err() {
            warn!("Stream closed before the first frame");
            return;
        }
        info!("Video playing, detection loop started for session {}", session);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sequence = 0u64;
        let mut overlay = Overlay::new(self.display);

        loop {
            ticker.tick().await;
            if frames.has_changed().is_err() {
                info!("Stream closed, detection loop for session {} ends", session);
                return;
            }
            let Some(frame) = frames.borrow_and_update().clone() else {
                continue;
            };

            sequence += 1;
            let stamp = TickStamp { session, sequence };
            overlay.match_dimensions(self.display);

            let Some(detections) = detect(&analyzer, frame.clone()).await else {
                continue;
            };
            let detections = resize_results(detections, frame.size(), self.display);

            overlay.clear();
            if !detections.is_empty() {
                overlay.draw_detections(&detections);
                overlay.draw_face_expressions(&detections, self.min_confidence);
            }
            let outcome = TickOutcome {
                reading: EmotionReading::from_detections(&detections),
                overlay: overlay.clone(),
            };
            debug!(
                "Tick {} found {} face(s): {:?}",
                sequence,
                detections.len(),
                outcome.reading
            );

            let applied = state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .apply_tick(stamp, outcome);
            if applied == Err(Rejection::SessionEnded) {
                info!("Session {} ended, detection loop stops", session);
                return;
            }
        }
    }
}

/// Runs one detection on the blocking pool. `None` skips the tick.
async fn detect(analyzer: &SharedAnalyzer, frame: Arc<Frame>) -> Option<Vec<FaceDetection>> {
    let analyzer = analyzer.clone();
    let result = tokio::task::spawn_blocking(move || {
        analyzer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detect_all_faces_with_expressions(&frame)
    })
    .await;

    match result {
        Ok(Ok(detections)) => Some(detections),
        Ok(Err(e)) if e.is_transient() => {
            warn!("Detection failed, skipping tick: {}", e);
            None
        }
        Ok(Err(e)) => {
            error!("Detection failed: {}", e);
            None
        }
        Err(e) => {
            error!("Detection task failed: {}", e);
            None
        }
    }
}
