// Transparent drawing surface laid over the video pane

use crate::models::{BoundingBox, DisplaySize, FaceDetection};

/// A face box with an optional score caption
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayBox {
    pub bbox: BoundingBox,
    pub caption: Option<String>,
}

/// A block of text lines anchored at a point of the surface
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayLabel {
    pub x: f32,
    pub y: f32,
    pub lines: Vec<String>,
}

/// Shapes to paint over the video, in surface pixels.
/// Rebuilt from scratch on every detection tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Overlay {
    size: DisplaySize,
    boxes: Vec<OverlayBox>,
    labels: Vec<OverlayLabel>,
}

impl Overlay {
    pub fn new(size: DisplaySize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Resizes the surface. Like a canvas resize, this also wipes it.
    pub fn match_dimensions(&mut self, size: DisplaySize) {
        if self.size != size {
            self.size = size;
            self.clear();
        }
    }

    pub fn clear(&mut self) {
        self.boxes.clear();
        self.labels.clear();
    }

    pub fn size(&self) -> DisplaySize {
        self.size
    }

    pub fn boxes(&self) -> &[OverlayBox] {
        &self.boxes
    }

    pub fn labels(&self) -> &[OverlayLabel] {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty() && self.labels.is_empty()
    }

    /// Draws a box per face, captioned with the detector score when known
    pub fn draw_detections(&mut self, detections: &[FaceDetection]) {
        for detection in detections {
            self.boxes.push(OverlayBox {
                bbox: self.clip(detection.bbox),
                caption: detection.score.map(|score| format!("{score:.2}")),
            });
        }
    }

    /// Lists the expressions of each face under its box
    pub fn draw_face_expressions(&mut self, detections: &[FaceDetection], min_confidence: f32) {
        for detection in detections {
            let lines: Vec<String> = detection
                .expressions
                .above(min_confidence)
                .into_iter()
                .map(|(expression, score)| format!("{expression} ({score:.2})"))
                .collect();
            if lines.is_empty() {
                continue;
            }
            let bbox = self.clip(detection.bbox);
            self.labels.push(OverlayLabel {
                x: bbox.x,
                y: bbox.y + bbox.height,
                lines,
            });
        }
    }

    /// Keeps a box inside the surface
    fn clip(&self, bbox: BoundingBox) -> BoundingBox {
        let (w, h) = (self.size.width as f32, self.size.height as f32);
        let x = bbox.x.clamp(0.0, w);
        let y = bbox.y.clamp(0.0, h);
        let right = (bbox.x + bbox.width).clamp(0.0, w);
        let bottom = (bbox.y + bbox.height).clamp(0.0, h);
        BoundingBox::new(x, y, right - x, bottom - y)
    }
}
