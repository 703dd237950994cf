// Core data models for the Emotion View application

/// Represents a single video frame with RGB data
#[derive(Clone, Debug)]
pub struct Frame {
    /// Raw RGB pixel data (width * height * 3 bytes)
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Frame {
    /// Creates a new Frame with the given parameters
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    pub fn size(&self) -> DisplaySize {
        DisplaySize::new(self.width, self.height)
    }
}

impl From<image::RgbImage> for Frame {
    fn from(image: image::RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height)
    }
}

/// Pixel dimensions of a drawing surface or coordinate space
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

impl DisplaySize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for DisplaySize {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

/// Facial expression classes, in the expression network's output order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Expression {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Expression {
    /// All expressions in model output order
    pub const ALL: [Expression; 7] = [
        Expression::Neutral,
        Expression::Happy,
        Expression::Sad,
        Expression::Angry,
        Expression::Fearful,
        Expression::Disgusted,
        Expression::Surprised,
    ];

    /// Lowercase label used in the UI and overlays
    pub fn label(self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Fearful => "fearful",
            Expression::Disgusted => "disgusted",
            Expression::Surprised => "surprised",
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-face expression probabilities, kept in insertion order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceExpressions {
    scores: Vec<(Expression, f32)>,
}

impl FaceExpressions {
    pub fn new(scores: Vec<(Expression, f32)>) -> Self {
        Self { scores }
    }

    /// Builds the map from model probabilities, indexed by `Expression::ALL`.
    /// Extra outputs beyond the known classes are ignored.
    pub fn from_probabilities(probabilities: &[f32]) -> Self {
        let scores = Expression::ALL
            .iter()
            .zip(probabilities)
            .map(|(&expression, &p)| (expression, p))
            .collect();
        Self { scores }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Expression, f32)> + '_ {
        self.scores.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn get(&self, expression: Expression) -> Option<f32> {
        self.scores
            .iter()
            .find(|(e, _)| *e == expression)
            .map(|(_, p)| *p)
    }

    /// Highest-scoring expression. On a tie the first one encountered wins.
    pub fn dominant(&self) -> Option<(Expression, f32)> {
        let mut iter = self.iter();
        let first = iter.next()?;
        Some(iter.fold(first, |max, candidate| {
            if candidate.1 > max.1 {
                candidate
            } else {
                max
            }
        }))
    }

    /// Expressions at or above `min_confidence`, highest first
    pub fn above(&self, min_confidence: f32) -> Vec<(Expression, f32)> {
        let mut kept: Vec<_> = self.iter().filter(|(_, p)| *p >= min_confidence).collect();
        // stable sort keeps map order between equal scores
        kept.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        kept
    }
}

/// Axis-aligned face box in pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Maps the box from the `from` coordinate space into `to`
    pub fn rescale(&self, from: DisplaySize, to: DisplaySize) -> Self {
        if from.width == 0 || from.height == 0 {
            return *self;
        }
        let sx = to.width as f32 / from.width as f32;
        let sy = to.height as f32 / from.height as f32;
        Self::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }
}

/// One detected face with its expression map
#[derive(Clone, Debug, PartialEq)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    /// Detector confidence, when the detector reports one
    pub score: Option<f32>,
    pub expressions: FaceExpressions,
    /// Recognition descriptor, only computed on request
    pub descriptor: Option<Vec<f32>>,
}

impl FaceDetection {
    pub fn new(bbox: BoundingBox, expressions: FaceExpressions) -> Self {
        Self {
            bbox,
            score: None,
            expressions,
            descriptor: None,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }
}

/// Rescales detection geometry from frame coordinates to the display size
pub fn resize_results(
    detections: Vec<FaceDetection>,
    from: DisplaySize,
    to: DisplaySize,
) -> Vec<FaceDetection> {
    detections
        .into_iter()
        .map(|mut detection| {
            detection.bbox = detection.bbox.rescale(from, to);
            detection
        })
        .collect()
}

/// The emotion shown in the emotion card
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmotionReading {
    pub expression: Expression,
    /// Confidence as a percentage (0 to 100)
    pub confidence: u8,
}

impl EmotionReading {
    /// Picks the dominant expression of the first detected face
    pub fn from_detections(detections: &[FaceDetection]) -> Option<Self> {
        let (expression, score) = detections.first()?.expressions.dominant()?;
        Some(Self {
            expression,
            confidence: confidence_percent(score),
        })
    }
}

/// Converts a probability into a rounded 0-100 percentage
pub fn confidence_percent(score: f32) -> u8 {
    (score.clamp(0.0, 1.0) * 100.0).round() as u8
}

impl std::fmt::Display for EmotionReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}% confidence)", self.expression, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(scores: Vec<(Expression, f32)>) -> FaceDetection {
        FaceDetection::new(
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            FaceExpressions::new(scores),
        )
    }

    #[test]
    fn dominant_picks_highest_score() {
        let detection = face(vec![
            (Expression::Happy, 0.2),
            (Expression::Sad, 0.7),
            (Expression::Neutral, 0.1),
        ]);
        let reading = EmotionReading::from_detections(&[detection]).unwrap();
        assert_eq!(reading.expression, Expression::Sad);
        assert_eq!(reading.expression.label(), "sad");
        assert_eq!(reading.confidence, 70);
    }

    #[test]
    fn dominant_tie_keeps_first_encountered() {
        let expressions =
            FaceExpressions::new(vec![(Expression::Happy, 0.5), (Expression::Sad, 0.5)]);
        assert_eq!(expressions.dominant(), Some((Expression::Happy, 0.5)));

        let reversed =
            FaceExpressions::new(vec![(Expression::Sad, 0.5), (Expression::Happy, 0.5)]);
        assert_eq!(reversed.dominant(), Some((Expression::Sad, 0.5)));
    }

    #[test]
    fn reading_uses_first_face_only() {
        let first = face(vec![(Expression::Angry, 0.6), (Expression::Happy, 0.4)]);
        let second = face(vec![(Expression::Happy, 0.99)]);
        let reading = EmotionReading::from_detections(&[first, second]).unwrap();
        assert_eq!(reading.expression, Expression::Angry);
        assert_eq!(reading.confidence, 60);
    }

    #[test]
    fn no_faces_means_no_reading() {
        assert_eq!(EmotionReading::from_detections(&[]), None);
        assert_eq!(EmotionReading::from_detections(&[face(vec![])]), None);
    }

    #[test]
    fn probabilities_follow_model_order() {
        let expressions = FaceExpressions::from_probabilities(&[0.1, 0.6, 0.05, 0.05, 0.1, 0.05, 0.05]);
        assert_eq!(expressions.get(Expression::Happy), Some(0.6));
        assert_eq!(expressions.get(Expression::Surprised), Some(0.05));
        assert_eq!(expressions.dominant().map(|(e, _)| e), Some(Expression::Happy));
    }

    #[test]
    fn above_sorts_descending_and_filters() {
        let expressions = FaceExpressions::new(vec![
            (Expression::Neutral, 0.3),
            (Expression::Happy, 0.05),
            (Expression::Sad, 0.6),
            (Expression::Angry, 0.1),
        ]);
        let kept: Vec<_> = expressions.above(0.1).into_iter().map(|(e, _)| e).collect();
        assert_eq!(
            kept,
            vec![Expression::Sad, Expression::Neutral, Expression::Angry]
        );
    }

    #[test]
    fn frame_from_rgb_image_keeps_dimensions() {
        let frame = Frame::from(image::RgbImage::new(4, 3));
        assert_eq!(frame.size(), DisplaySize::new(4, 3));
        assert_eq!(frame.data.len(), 4 * 3 * 3);
    }

    #[test]
    fn rescale_maps_frame_to_display() {
        let bbox = BoundingBox::new(30.0, 20.0, 60.0, 40.0);
        let scaled = bbox.rescale(DisplaySize::new(320, 240), DisplaySize::new(640, 480));
        assert_eq!(scaled, BoundingBox::new(60.0, 40.0, 120.0, 80.0));
    }

    #[test]
    fn rescale_from_empty_space_is_identity() {
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(bbox.rescale(DisplaySize::new(0, 0), DisplaySize::default()), bbox);
    }

    #[test]
    fn confidence_rounds_to_nearest_percent() {
        assert_eq!(confidence_percent(0.706), 71);
        assert_eq!(confidence_percent(0.004), 0);
        assert_eq!(confidence_percent(1.0), 100);
        assert_eq!(confidence_percent(1.3), 100);
    }
}
