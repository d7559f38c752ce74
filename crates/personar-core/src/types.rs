use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel-space face box in the native resolution of the analysed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five alignment keypoints: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub keypoints: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Face descriptor produced by the recognition network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two descriptors of equal dimension.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face found in an image: box, landmarks and descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Dense landmark points in image coordinates (empty if the estimator was skipped).
    pub landmarks: Vec<(f32, f32)>,
    pub embedding: Embedding,
}

/// Reference descriptors for one identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledDescriptors {
    pub label: String,
    pub descriptors: Vec<Embedding>,
}

/// Outcome label of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "label")]
pub enum MatchLabel {
    Known(String),
    Unknown,
}

impl MatchLabel {
    pub fn as_known(&self) -> Option<&str> {
        match self {
            MatchLabel::Known(label) => Some(label),
            MatchLabel::Unknown => None,
        }
    }
}

impl fmt::Display for MatchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchLabel::Known(label) => f.write_str(label),
            MatchLabel::Unknown => f.write_str("unknown"),
        }
    }
}

/// Best match for one descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    pub label: MatchLabel,
    /// Euclidean distance to the nearest reference descriptor.
    pub distance: f32,
}

/// A detection resolved against the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedFace {
    pub bbox: BoundingBox,
    pub landmarks: Vec<(f32, f32)>,
    pub label: MatchLabel,
    pub distance: f32,
}
