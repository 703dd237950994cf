// One-shot model loading gate shared by every consumer of the analyzer

use crate::analyzer::{ExpressionClassifier, FaceAnalysis, FaceAnalyzer, FaceDetector, FaceRecognizer};
use crate::config::AppConfig;
use crate::error::{EmotionViewError, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Fast face detector bundle
pub const DETECTOR_BUNDLE: &str = "haarcascade_frontalface_default.xml";
/// Face recognition network bundle
pub const RECOGNITION_BUNDLE: &str = "face_recognition.onnx";
/// Face expression network bundle
pub const EXPRESSION_BUNDLE: &str = "face_expression.onnx";

/// Analyzer shared between the detection loop and the loader
pub type SharedAnalyzer = Arc<Mutex<dyn FaceAnalysis>>;

/// Result of the one-shot model initialization
#[derive(Clone)]
pub enum ModelStatus {
    Loading,
    Ready(SharedAnalyzer),
    Failed(String),
}

impl std::fmt::Debug for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelStatus::Loading => f.write_str("Loading"),
            ModelStatus::Ready(_) => f.write_str("Ready"),
            ModelStatus::Failed(reason) => f.debug_tuple("Failed").field(reason).finish(),
        }
    }
}

/// Publishes the model status once loading settles. Never retries.
#[derive(Clone)]
pub struct ModelGate {
    status: watch::Receiver<ModelStatus>,
}

impl ModelGate {
    /// Runs `load` on the runtime and publishes its outcome
    pub fn spawn<F>(runtime: &Handle, load: F) -> Self
    where
        F: Future<Output = Result<SharedAnalyzer>> + Send + 'static,
    {
        let (sender, status) = watch::channel(ModelStatus::Loading);
        runtime.spawn(async move {
            let outcome = match load.await {
                Ok(analyzer) => {
                    info!("Models loaded successfully");
                    ModelStatus::Ready(analyzer)
                }
                Err(e) => {
                    error!("Error loading models: {}", e);
                    ModelStatus::Failed(e.to_string())
                }
            };
            sender.send_replace(outcome);
        });
        Self { status }
    }

    /// A gate that is already open
    pub fn ready(analyzer: SharedAnalyzer) -> Self {
        let (_sender, status) = watch::channel(ModelStatus::Ready(analyzer));
        Self { status }
    }

    pub fn status(&self) -> ModelStatus {
        self.status.borrow().clone()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.status.borrow(), ModelStatus::Ready(_))
    }

    pub fn analyzer(&self) -> Option<SharedAnalyzer> {
        match &*self.status.borrow() {
            ModelStatus::Ready(analyzer) => Some(analyzer.clone()),
            _ => None,
        }
    }

    /// Waits until loading has either succeeded or failed
    pub async fn wait(&self) -> ModelStatus {
        let mut status = self.status.clone();
        let settled = match status
            .wait_for(|s| !matches!(s, ModelStatus::Loading))
            .await
        {
            Ok(settled) => settled.clone(),
            Err(_) => ModelStatus::Failed("model loader stopped before finishing".to_string()),
        };
        settled
    }
}

/// Resolves a bundle inside the model directory, failing early when it is absent
fn bundle_path(model_dir: &Path, name: &str) -> Result<PathBuf> {
    let path = model_dir.join(name);
    if !path.is_file() {
        return Err(EmotionViewError::ModelLoad(format!(
            "Model bundle {name} not found in {model_dir:?}"
        )));
    }
    Ok(path)
}

async fn join_load<T>(task: JoinHandle<Result<T>>) -> Result<T> {
    task.await
        .map_err(|e| EmotionViewError::ModelLoad(format!("Load task failed: {e}")))?
}

/// Loads the detector, recognition net and expression net concurrently
pub async fn load_face_analyzer(config: AppConfig) -> Result<SharedAnalyzer> {
    let model_dir = config.model_dir.clone();
    info!("Loading model bundles from {:?}", model_dir);

    let detector = tokio::task::spawn_blocking({
        let model_dir = model_dir.clone();
        let params = config.detector.clone();
        move || FaceDetector::load(&bundle_path(&model_dir, DETECTOR_BUNDLE)?, params)
    });
    let recognizer = tokio::task::spawn_blocking({
        let model_dir = model_dir.clone();
        move || FaceRecognizer::load(&bundle_path(&model_dir, RECOGNITION_BUNDLE)?)
    });
    let classifier = tokio::task::spawn_blocking({
        let model_dir = model_dir.clone();
        move || ExpressionClassifier::load(&bundle_path(&model_dir, EXPRESSION_BUNDLE)?)
    });

    let (detector, recognizer, classifier) = tokio::try_join!(
        join_load(detector),
        join_load(recognizer),
        join_load(classifier)
    )?;

    let analyzer: SharedAnalyzer = Arc::new(Mutex::new(FaceAnalyzer::new(
        detector,
        recognizer,
        classifier,
        config.compute_descriptors,
    )));
    Ok(analyzer)
}
