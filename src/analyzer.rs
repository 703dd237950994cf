// Face analysis backed by an OpenCV cascade and two ONNX networks

use crate::config::DetectorConfig;
use crate::error::{EmotionViewError, Result};
use crate::models::{BoundingBox, Expression, FaceDetection, FaceExpressions, Frame};
use ndarray::Array4;
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::imgproc;
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use tracing::{error, warn};

/// Side length of the expression network input
const EXPRESSION_INPUT: i32 = 112;
/// Side length of the recognition network input
const RECOGNITION_INPUT: i32 = 150;

/// Anything that can find faces in a frame and classify their expressions
pub trait FaceAnalysis: Send {
    fn detect_all_faces_with_expressions(&mut self, frame: &Frame) -> Result<Vec<FaceDetection>>;
}

/// Face detector using OpenCV Haar Cascade
pub struct FaceDetector {
    classifier: CascadeClassifier,
    params: DetectorConfig,
}

impl FaceDetector {
    /// Loads the Haar Cascade classifier
    pub fn load(cascade_path: &Path, params: DetectorConfig) -> Result<Self> {
        let path = cascade_path.to_string_lossy();
        let classifier = CascadeClassifier::new(&path).map_err(|e| {
            error!("Failed to load Haar Cascade {}: {}", path, e);
            EmotionViewError::ModelLoad(format!("Haar Cascade load failed: {e}"))
        })?;

        if classifier.empty()? {
            return Err(EmotionViewError::ModelLoad(format!(
                "Haar Cascade classifier at {path} is empty"
            )));
        }

        Ok(Self { classifier, params })
    }

    /// Finds face rectangles in an RGB image
    fn detect(&mut self, rgb: &Mat) -> Result<Vec<Rect>> {
        let mut gray = Mat::default();
        imgproc::cvt_color(
            rgb,
            &mut gray,
            imgproc::COLOR_RGB2GRAY,
            0,
            opencv::core::AlgorithmHint::ALGO_HINT_DEFAULT,
        )
        .map_err(|e| {
            EmotionViewError::FaceDetection(format!("Failed to convert to grayscale: {e}"))
        })?;

        let min_size = self.params.min_face_size;
        let mut faces = Vector::<Rect>::new();
        self.classifier
            .detect_multi_scale(
                &gray,
                &mut faces,
                self.params.scale_factor,
                self.params.min_neighbors,
                0,
                Size::new(min_size, min_size),
                Size::new(0, 0),
            )
            .map_err(|e| EmotionViewError::FaceDetection(format!("Face detection failed: {e}")))?;

        Ok(faces.to_vec())
    }
}

/// Crops a face out of the RGB image and resizes it to `side` x `side`
fn crop_face(rgb: &Mat, rect: Rect, side: i32) -> Result<Vec<u8>> {
    let face_roi = Mat::roi(rgb, rect).map_err(|e| {
        EmotionViewError::FrameProcessing(format!("Failed to crop face region: {e}"))
    })?;

    let mut resized = Mat::default();
    imgproc::resize(
        &face_roi,
        &mut resized,
        Size::new(side, side),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )
    .map_err(|e| EmotionViewError::FrameProcessing(format!("Failed to resize face: {e}")))?;

    let data = resized.data_bytes().map_err(|e| {
        EmotionViewError::FrameProcessing(format!("Failed to get resized data: {e}"))
    })?;
    Ok(data.to_vec())
}

/// Converts interleaved RGB bytes into a normalized `[1, 3, side, side]` tensor
fn to_chw_tensor(hwc: &[u8], side: usize) -> Result<Array4<f32>> {
    let channels = 3;
    if hwc.len() != side * side * channels {
        return Err(EmotionViewError::FrameProcessing(format!(
            "Expected {} bytes for a {side}x{side} face, got {}",
            side * side * channels,
            hwc.len()
        )));
    }

    let mut chw = vec![0.0f32; channels * side * side];
    for h in 0..side {
        for w in 0..side {
            for c in 0..channels {
                let hwc_idx = (h * side + w) * channels + c;
                let chw_idx = c * (side * side) + h * side + w;
                chw[chw_idx] = hwc[hwc_idx] as f32 / 255.0;
            }
        }
    }

    Array4::from_shape_vec((1, channels, side, side), chw)
        .map_err(|e| EmotionViewError::OnnxRuntime(format!("Failed to create input array: {e}")))
}

/// Loads an ONNX session, reporting failures as model load errors
fn load_session(model_path: &Path) -> Result<Session> {
    Session::builder()
        .map_err(|e| {
            EmotionViewError::ModelLoad(format!("Failed to create session builder: {e}"))
        })?
        .commit_from_file(model_path)
        .map_err(|e| {
            error!("Failed to load ONNX model {:?}: {}", model_path, e);
            EmotionViewError::ModelLoad(format!("ONNX model load failed: {e}"))
        })
}

/// Runs a single-input session and returns its first output as a flat vector
fn run_first_output(session: &mut Session, input: Array4<f32>) -> Result<Vec<f32>> {
    let input_tensor = Value::from_array(input).map_err(|e| {
        EmotionViewError::OnnxRuntime(format!("Failed to create input tensor: {e}"))
    })?;

    let outputs = session.run(ort::inputs![input_tensor]).map_err(|e| {
        error!("ONNX inference failed: {}", e);
        EmotionViewError::OnnxRuntime(format!("Inference failed: {e}"))
    })?;

    let (_, output_value) = outputs
        .iter()
        .next()
        .ok_or_else(|| EmotionViewError::OnnxRuntime("No output from model".to_string()))?;

    let (_, data) = output_value.try_extract_tensor::<f32>().map_err(|e| {
        EmotionViewError::OnnxRuntime(format!("Failed to extract output tensor: {e}"))
    })?;
    Ok(data.to_vec())
}

/// Treats the output as probabilities when it already is a distribution, otherwise applies softmax
pub fn to_probabilities(output: &[f32]) -> Vec<f32> {
    let in_range = output.iter().all(|p| (0.0..=1.0).contains(p));
    let sum: f32 = output.iter().sum();
    if in_range && (sum - 1.0).abs() < 1e-3 {
        return output.to_vec();
    }

    let max_logit = output.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_sum: f32 = output.iter().map(|&x| (x - max_logit).exp()).sum();
    output
        .iter()
        .map(|&x| (x - max_logit).exp() / exp_sum)
        .collect()
}

/// Expression classifier using ONNX Runtime
pub struct ExpressionClassifier {
    session: Session,
}

impl ExpressionClassifier {
    pub fn load(model_path: &Path) -> Result<Self> {
        Ok(Self {
            session: load_session(model_path)?,
        })
    }

    /// Classifies a cropped RGB face into the full expression map
    pub fn classify(&mut self, face_rgb: &[u8]) -> Result<FaceExpressions> {
        let input = to_chw_tensor(face_rgb, EXPRESSION_INPUT as usize)?;
        let output = run_first_output(&mut self.session, input)?;
        if output.len() < Expression::ALL.len() {
            warn!(
                "Expression model produced {} outputs, expected {}",
                output.len(),
                Expression::ALL.len()
            );
        }
        Ok(FaceExpressions::from_probabilities(&to_probabilities(&output)))
    }
}

/// Face recognition network producing a descriptor per face
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    pub fn load(model_path: &Path) -> Result<Self> {
        Ok(Self {
            session: load_session(model_path)?,
        })
    }

    pub fn describe(&mut self, face_rgb: &[u8]) -> Result<Vec<f32>> {
        let input = to_chw_tensor(face_rgb, RECOGNITION_INPUT as usize)?;
        run_first_output(&mut self.session, input)
    }
}

/// Combines face detection, recognition and expression classification
pub struct FaceAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    classifier: ExpressionClassifier,
    compute_descriptors: bool,
}

impl FaceAnalyzer {
    pub fn new(
        detector: FaceDetector,
        recognizer: FaceRecognizer,
        classifier: ExpressionClassifier,
        compute_descriptors: bool,
    ) -> Self {
        Self {
            detector,
            recognizer,
            classifier,
            compute_descriptors,
        }
    }
}

impl FaceAnalysis for FaceAnalyzer {
    fn detect_all_faces_with_expressions(&mut self, frame: &Frame) -> Result<Vec<FaceDetection>> {
        // Convert frame data to OpenCV Mat
        let mat = Mat::from_slice(&frame.data).map_err(|e| {
            EmotionViewError::FaceDetection(format!("Failed to create Mat: {e}"))
        })?;
        let rgb = mat.reshape(3, frame.height as i32).map_err(|e| {
            EmotionViewError::FaceDetection(format!("Failed to reshape Mat: {e}"))
        })?;
        let rgb = rgb.try_clone()?;

        let mut detections = Vec::new();
        for rect in self.detector.detect(&rgb)? {
            let face = match crop_face(&rgb, rect, EXPRESSION_INPUT) {
                Ok(face) => face,
                Err(e) => {
                    warn!("Failed to extract face region: {}", e);
                    continue;
                }
            };
            let expressions = self.classifier.classify(&face)?;
            let bbox = BoundingBox::new(
                rect.x as f32,
                rect.y as f32,
                rect.width as f32,
                rect.height as f32,
            );
            let mut detection = FaceDetection::new(bbox, expressions);

            if self.compute_descriptors {
                let face = crop_face(&rgb, rect, RECOGNITION_INPUT)?;
                detection.descriptor = Some(self.recognizer.describe(&face)?);
            }
            detections.push(detection);
        }

        Ok(detections)
    }
}
