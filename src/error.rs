// Error types for the Emotion View application

use thiserror::Error;

/// Main error type for the Emotion View application
#[derive(Debug, Error)]
pub enum EmotionViewError {
    #[error("Camera initialization failed: {0}")]
    CameraInit(String),

    #[error("Camera access denied: {0}")]
    CameraAccess(String),

    #[error("Frame processing failed: {0}")]
    FrameProcessing(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Face detection failed: {0}")]
    FaceDetection(String),

    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(String),

    #[error("OpenCV error: {0}")]
    OpenCV(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Emotion View operations
pub type Result<T> = std::result::Result<T, EmotionViewError>;

// Conversion from nokhwa errors
impl From<nokhwa::NokhwaError> for EmotionViewError {
    fn from(err: nokhwa::NokhwaError) -> Self {
        match err {
            nokhwa::NokhwaError::OpenDeviceError(device, error) => {
                EmotionViewError::CameraAccess(format!("Device {device}: {error}"))
            }
            nokhwa::NokhwaError::OpenStreamError(error) => {
                EmotionViewError::CameraAccess(format!("Stream: {error}"))
            }
            nokhwa::NokhwaError::StructureError { structure, error } => {
                EmotionViewError::CameraInit(format!("{structure}: {error}"))
            }
            nokhwa::NokhwaError::GetPropertyError { property, error } => {
                EmotionViewError::CameraInit(format!("Property {property}: {error}"))
            }
            _ => EmotionViewError::CameraInit(err.to_string()),
        }
    }
}

// Conversion from OpenCV errors
impl From<opencv::Error> for EmotionViewError {
    fn from(err: opencv::Error) -> Self {
        EmotionViewError::OpenCV(err.to_string())
    }
}

// Conversion from ONNX Runtime errors
impl From<ort::Error> for EmotionViewError {
    fn from(err: ort::Error) -> Self {
        EmotionViewError::OnnxRuntime(err.to_string())
    }
}

impl EmotionViewError {
    /// True for failures that happen while a detection tick runs
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EmotionViewError::FrameProcessing(_)
                | EmotionViewError::FaceDetection(_)
                | EmotionViewError::OnnxRuntime(_)
                | EmotionViewError::OpenCV(_)
        )
    }
}
