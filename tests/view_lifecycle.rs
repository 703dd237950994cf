use emotion_view::analyzer::FaceAnalysis;
use emotion_view::camera::{FrameReceiver, MediaDevices, MediaStream, VideoConstraints};
use emotion_view::config::AppConfig;
use emotion_view::error::{EmotionViewError, Result};
use emotion_view::loader::{ModelGate, SharedAnalyzer};
use emotion_view::models::{BoundingBox, Expression, FaceDetection, FaceExpressions, Frame};
use emotion_view::state::{CameraState, ModelsState};
use emotion_view::view::EmotionDetectionView;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Analyzer whose answer the test can change at any time
#[derive(Clone, Default)]
struct Puppet {
    faces: Arc<Mutex<Vec<FaceDetection>>>,
}

impl Puppet {
    fn show(&self, faces: Vec<FaceDetection>) {
        *self.faces.lock().unwrap() = faces;
    }
}

impl FaceAnalysis for Puppet {
    fn detect_all_faces_with_expressions(&mut self, _frame: &Frame) -> Result<Vec<FaceDetection>> {
        Ok(self.faces.lock().unwrap().clone())
    }
}

struct FakeStream {
    _frames_tx: watch::Sender<Option<Arc<Frame>>>,
    frames: FrameReceiver,
    live: Arc<AtomicUsize>,
    stopped: bool,
}

impl MediaStream for FakeStream {
    fn frames(&self) -> FrameReceiver {
        self.frames.clone()
    }

    fn stop_tracks(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn live_tracks(&self) -> usize {
        usize::from(!self.stopped)
    }

    fn label(&self) -> String {
        "fake camera".to_string()
    }
}

/// Counts live tracks across every stream it hands out
#[derive(Default)]
struct FakeDevices {
    live: Arc<AtomicUsize>,
    requests: AtomicUsize,
    deny: bool,
    grant_delay: Option<Duration>,
}

impl FakeDevices {
    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl MediaDevices for FakeDevices {
    fn get_user_media(&self, constraints: &VideoConstraints) -> Result<Box<dyn MediaStream>> {
        assert_eq!(constraints.min_width, 300);
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.grant_delay {
            std::thread::sleep(delay);
        }
        if self.deny {
            return Err(EmotionViewError::CameraAccess("permission denied".into()));
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        let frame = Arc::new(Frame::new(vec![0; 64 * 48 * 3], 64, 48));
        let (frames_tx, frames) = watch::channel(Some(frame));
        Ok(Box::new(FakeStream {
            _frames_tx: frames_tx,
            frames,
            live: self.live.clone(),
            stopped: false,
        }))
    }
}

fn sad_face() -> FaceDetection {
    FaceDetection::new(
        BoundingBox::new(8.0, 6.0, 16.0, 12.0),
        FaceExpressions::new(vec![
            (Expression::Happy, 0.2),
            (Expression::Sad, 0.7),
            (Expression::Neutral, 0.1),
        ]),
    )
}

fn config() -> AppConfig {
    AppConfig {
        poll_interval_ms: 5,
        ..AppConfig::default()
    }
}

fn ready_gate(puppet: &Puppet) -> ModelGate {
    let analyzer: SharedAnalyzer = Arc::new(Mutex::new(puppet.clone()));
    ModelGate::ready(analyzer)
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(3), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_is_disabled_until_models_load() {
    let puppet = Puppet::default();
    let (release, released) = tokio::sync::oneshot::channel::<()>();
    let analyzer: SharedAnalyzer = Arc::new(Mutex::new(puppet.clone()));
    let gate = ModelGate::spawn(&Handle::current(), async move {
        let _ = released.await;
        Ok(analyzer)
    });
    let devices = Arc::new(FakeDevices::default());
    let view = EmotionDetectionView::new(config(), Handle::current(), devices.clone(), gate);

    let loading = view.snapshot();
    assert_eq!(loading.models, ModelsState::Loading);
    assert!(!loading.toggle_button().enabled);
    assert!(view.start().is_none());
    assert_eq!(devices.requests.load(Ordering::SeqCst), 0);

    release.send(()).unwrap();
    view.models().wait().await;

    let loaded = view.snapshot();
    assert!(loaded.models_loaded());
    assert!(loaded.toggle_button().enabled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_models_keep_start_disabled() {
    let gate = ModelGate::spawn(&Handle::current(), async {
        Err(EmotionViewError::ModelLoad("face_expression.onnx not found".into()))
    });
    let devices = Arc::new(FakeDevices::default());
    let view = EmotionDetectionView::new(config(), Handle::current(), devices.clone(), gate);

    view.models().wait().await;
    let snapshot = view.snapshot();
    assert!(matches!(snapshot.models, ModelsState::Failed(_)));
    assert!(!snapshot.toggle_button().enabled);
    assert!(view.start().is_none());
    assert_eq!(devices.live(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_without_a_stream_is_a_no_op() {
    let puppet = Puppet::default();
    let devices = Arc::new(FakeDevices::default());
    let view = EmotionDetectionView::new(config(), Handle::current(), devices.clone(), ready_gate(&puppet));

    let before = view.snapshot();
    view.stop();
    let after = view.snapshot();
    assert_eq!(before.camera, after.camera);
    assert_eq!(before.emotion, after.emotion);
    assert_eq!(after.camera, CameraState::Idle);
    assert_eq!(devices.live(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_then_stop_releases_every_track() {
    let puppet = Puppet::default();
    puppet.show(vec![sad_face()]);
    let devices = Arc::new(FakeDevices::default());
    let view = EmotionDetectionView::new(config(), Handle::current(), devices.clone(), ready_gate(&puppet));

    view.start().unwrap().await.unwrap();
    assert_eq!(view.snapshot().camera, CameraState::Active);
    assert_eq!(devices.live(), 1);
    assert_eq!(view.live_tracks(), 1);
    assert!(view.detection_active());

    eventually("the first emotion", || view.snapshot().emotion.is_some()).await;
    let card = view.snapshot().emotion_card().unwrap();
    assert_eq!(card.label, "sad");
    assert_eq!(card.confidence, 70);
    assert!(view.snapshot().shows_video());

    view.stop();
    assert_eq!(devices.live(), 0);
    assert_eq!(view.live_tracks(), 0);
    assert!(!view.detection_active());

    let stopped = view.snapshot();
    assert_eq!(stopped.camera, CameraState::Idle);
    assert_eq!(stopped.emotion, None);
    assert!(stopped.overlay.is_empty());

    // no late tick may bring the emotion back
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(view.snapshot().emotion, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_faces_hide_the_emotion_card() {
    let puppet = Puppet::default();
    puppet.show(vec![sad_face()]);
    let devices = Arc::new(FakeDevices::default());
    let view = EmotionDetectionView::new(config(), Handle::current(), devices.clone(), ready_gate(&puppet));

    view.start().unwrap().await.unwrap();
    eventually("the first emotion", || view.snapshot().emotion.is_some()).await;

    puppet.show(Vec::new());
    eventually("the emotion to clear", || view.snapshot().emotion.is_none()).await;
    let snapshot = view.snapshot();
    assert_eq!(snapshot.emotion_card(), None);
    assert!(snapshot.overlay.is_empty());
    assert_eq!(snapshot.camera, CameraState::Active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_the_view_stops_all_tracks() {
    let puppet = Puppet::default();
    let devices = Arc::new(FakeDevices::default());
    let view = EmotionDetectionView::new(config(), Handle::current(), devices.clone(), ready_gate(&puppet));

    view.start().unwrap().await.unwrap();
    assert_eq!(devices.live(), 1);

    drop(view);
    assert_eq!(devices.live(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn denied_camera_stays_idle() {
    let puppet = Puppet::default();
    let devices = Arc::new(FakeDevices {
        deny: true,
        ..FakeDevices::default()
    });
    let view = EmotionDetectionView::new(config(), Handle::current(), devices.clone(), ready_gate(&puppet));

    view.start().unwrap().await.unwrap();
    let snapshot = view.snapshot();
    assert_eq!(snapshot.camera, CameraState::Idle);
    assert!(!snapshot.shows_video());
    assert_eq!(snapshot.toggle_button().label, "Start Camera");
    assert_eq!(devices.live(), 0);

    // a later attempt is allowed
    assert!(view.start().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_while_requesting_releases_the_late_stream() {
    let puppet = Puppet::default();
    let devices = Arc::new(FakeDevices {
        grant_delay: Some(Duration::from_millis(50)),
        ..FakeDevices::default()
    });
    let view = EmotionDetectionView::new(config(), Handle::current(), devices.clone(), ready_gate(&puppet));

    let request = view.start().unwrap();
    assert_eq!(view.snapshot().camera, CameraState::Requesting);
    view.stop();
    assert_eq!(view.snapshot().camera, CameraState::Idle);

    request.await.unwrap();
    assert_eq!(devices.requests.load(Ordering::SeqCst), 1);
    assert_eq!(devices.live(), 0);
    assert_eq!(view.snapshot().camera, CameraState::Idle);
    assert!(!view.detection_active());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_start_while_active_is_ignored() {
    let puppet = Puppet::default();
    let devices = Arc::new(FakeDevices::default());
    let view = EmotionDetectionView::new(config(), Handle::current(), devices.clone(), ready_gate(&puppet));

    view.start().unwrap().await.unwrap();
    assert!(view.start().is_none());
    assert_eq!(devices.requests.load(Ordering::SeqCst), 1);
    assert_eq!(devices.live(), 1);
    view.stop();
}
