// The emotion detection view: camera lifecycle, model gate and detection loop in one place

use crate::camera::{FrameReceiver, MediaDevices, MediaStream, VideoConstraints};
use crate::config::AppConfig;
use crate::detection::{DetectionLoop, DetectionTask};
use crate::loader::{ModelGate, ModelStatus, SharedAnalyzer};
use crate::models::Frame;
use crate::state::{CameraState, ModelsState, ViewSnapshot, ViewState};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The stream and detection loop of one capture session
struct Capture {
    stream: Box<dyn MediaStream>,
    frames: FrameReceiver,
    detection: Option<DetectionTask>,
}

struct Shared {
    config: AppConfig,
    runtime: Handle,
    devices: Arc<dyn MediaDevices>,
    models: ModelGate,
    // lock order: capture, then state
    capture: Mutex<Option<Capture>>,
    state: Arc<Mutex<ViewState>>,
}

/// Owns the camera stream while capture is active. Dropping the view releases it.
pub struct EmotionDetectionView {
    shared: Arc<Shared>,
}

impl EmotionDetectionView {
    pub fn new(
        config: AppConfig,
        runtime: Handle,
        devices: Arc<dyn MediaDevices>,
        models: ModelGate,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                runtime,
                devices,
                models,
                capture: Mutex::new(None),
                state: Arc::new(Mutex::new(ViewState::default())),
            }),
        }
    }

    pub fn models(&self) -> &ModelGate {
        &self.shared.models
    }

    /// Requests the camera. Ignored until the models are loaded or while a capture is running.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        let Some(analyzer) = self.shared.models.analyzer() else {
            warn!("Start ignored: models are not loaded");
            return None;
        };
        let Some(session) = lock(&self.shared.state).begin_request() else {
            warn!("Start ignored: camera is already requested or active");
            return None;
        };

        info!("Requesting camera for session {}", session);
        let shared = self.shared.clone();
        Some(
            self.shared
                .runtime
                .spawn(async move { shared.acquire(session, analyzer).await }),
        )
    }

    /// Releases the camera. A no-op when nothing is requested or attached.
    pub fn stop(&self) {
        self.shared.release();
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let models = match self.shared.models.status() {
            ModelStatus::Loading => ModelsState::Loading,
            ModelStatus::Ready(_) => ModelsState::Loaded,
            ModelStatus::Failed(reason) => ModelsState::Failed(reason),
        };
        let state = lock(&self.shared.state);
        ViewSnapshot {
            models,
            camera: state.camera(),
            emotion: state.emotion(),
            overlay: state.overlay().clone(),
        }
    }

    /// Most recent video frame of the active stream
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        lock(&self.shared.capture)
            .as_ref()
            .and_then(|capture| capture.frames.borrow().clone())
    }

    /// Live tracks of the attached stream, zero when none is attached
    pub fn live_tracks(&self) -> usize {
        lock(&self.shared.capture)
            .as_ref()
            .map_or(0, |capture| capture.stream.live_tracks())
    }

    /// Whether a detection loop is scheduled for the attached stream
    pub fn detection_active(&self) -> bool {
        lock(&self.shared.capture)
            .as_ref()
            .and_then(|capture| capture.detection.as_ref())
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for EmotionDetectionView {
    fn drop(&mut self) {
        self.shared.release();
    }
}

impl Shared {
    fn constraints(&self) -> VideoConstraints {
        VideoConstraints {
            camera_index: self.config.camera_index,
            min_width: self.config.min_capture_width,
        }
    }

    async fn acquire(self: Arc<Self>, session: u64, analyzer: SharedAnalyzer) {
        let devices = self.devices.clone();
        let constraints = self.constraints();
        let granted =
            tokio::task::spawn_blocking(move || devices.get_user_media(&constraints)).await;

        let mut stream = match granted {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("Error accessing the camera: {}", e);
                lock(&self.state).request_failed(session);
                return;
            }
            Err(e) => {
                error!("Camera request task failed: {}", e);
                lock(&self.state).request_failed(session);
                return;
            }
        };

        let mut capture = lock(&self.capture);
        let mut state = lock(&self.state);
        if !state.activate(session) {
            drop(state);
            drop(capture);
            info!("Camera granted after session {} ended, releasing it", session);
            stream.stop_tracks();
            return;
        }

        info!("Camera active: {}", stream.label());
        let frames = stream.frames();
        let detection = DetectionLoop::from_config(&self.config).spawn(
            &self.runtime,
            session,
            frames.clone(),
            analyzer,
            self.state.clone(),
        );
        *capture = Some(Capture {
            stream,
            frames,
            detection: Some(detection),
        });
    }

    /// Cancels the detection loop, stops every track and resets the emotion state
    fn release(&self) {
        let mut capture = lock(&self.capture);
        let mut state = lock(&self.state);
        if capture.is_none() && state.camera() == CameraState::Idle {
            return;
        }

        if let Some(mut released) = capture.take() {
            if let Some(detection) = released.detection.take() {
                detection.cancel();
            }
            released.stream.stop_tracks();
            info!("Camera released");
        } else {
            info!("Pending camera request cancelled");
        }
        state.end_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::FaceAnalysis;
    use crate::error::Result;
    use crate::models::FaceDetection;

    struct NoFaces;

    impl FaceAnalysis for NoFaces {
        fn detect_all_faces_with_expressions(&mut self, _frame: &Frame) -> Result<Vec<FaceDetection>> {
            Ok(Vec::new())
        }
    }

    struct NoDevices;

    impl MediaDevices for NoDevices {
        fn get_user_media(&self, _constraints: &VideoConstraints) -> Result<Box<dyn MediaStream>> {
            Err(crate::error::EmotionViewError::CameraAccess("no camera".into()))
        }
    }

    fn view(models: ModelGate) -> EmotionDetectionView {
        EmotionDetectionView::new(
            AppConfig::default(),
            Handle::current(),
            Arc::new(NoDevices),
            models,
        )
    }

    #[tokio::test]
    async fn stop_when_idle_changes_nothing() {
        let view = view(ModelGate::ready(Arc::new(Mutex::new(NoFaces))));
        let before = view.snapshot();
        view.stop();
        view.stop();
        let after = view.snapshot();
        assert_eq!(before.camera, after.camera);
        assert_eq!(before.emotion, after.emotion);
        assert_eq!(lock(&view.shared.state).session(), 0);
        assert_eq!(view.live_tracks(), 0);
    }

    #[tokio::test]
    async fn start_is_ignored_without_models() {
        let view = view(ModelGate::spawn(&Handle::current(), std::future::pending()));
        assert!(view.start().is_none());
        assert_eq!(view.snapshot().camera, CameraState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn refused_camera_returns_to_idle() {
        let view = view(ModelGate::ready(Arc::new(Mutex::new(NoFaces))));
        let request = view.start().unwrap();
        request.await.unwrap();
        assert_eq!(view.snapshot().camera, CameraState::Idle);
        assert_eq!(view.live_tracks(), 0);
        assert!(!view.detection_active());
    }
}
