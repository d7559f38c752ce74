//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the frame into the 640×640 network input, decodes the three
//! anchor-free stride heads and suppresses overlapping boxes.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: u32 = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [u32; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("unexpected model layout: {0}")]
    BadModel(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Where the resized frame sits inside the square network input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((INPUT_SIZE as f32 - new_w) / 2.0).floor(),
            pad_y: ((INPUT_SIZE as f32 - new_h) / 2.0).floor(),
        }
    }

    fn to_frame(&self, (x, y): (f32, f32)) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output positions of (score, bbox, keypoints) for one stride.
type HeadIndices = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    heads: [HeadIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 9 {
            return Err(DetectorError::BadModel(format!(
                "expected 9 outputs (score/bbox/kps per stride), got {}",
                names.len()
            )));
        }
        let heads = head_indices(&names);

        tracing::info!(
            path = %model_path.display(),
            outputs = ?names,
            ?heads,
            "loaded SCRFD model"
        );

        Ok(Self { session, heads })
    }

    /// Detect faces, most confident first.
    pub fn detect(&mut self, image: &GrayImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        let (input, letterbox) = preprocess(image);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (&stride, &(score_idx, bbox_idx, kps_idx)) in STRIDES.iter().zip(self.heads.iter()) {
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let head = StrideHead {
                stride,
                scores: extract(score_idx, "scores")?,
                boxes: extract(bbox_idx, "boxes")?,
                keypoints: extract(kps_idx, "keypoints")?,
            };
            candidates.extend(head.decode(&letterbox, SCORE_THRESHOLD));
        }

        let faces = suppress(candidates, NMS_IOU_THRESHOLD);
        tracing::debug!(faces = faces.len(), "SCRFD detect");
        Ok(faces)
    }
}

/// Resize into the letterboxed input and normalise to an NCHW tensor.
fn preprocess(image: &GrayImage) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height());
    let new_w = ((image.width() as f32 * letterbox.scale).round() as u32).clamp(1, INPUT_SIZE);
    let new_h = ((image.height() as f32 * letterbox.scale).round() as u32).clamp(1, INPUT_SIZE);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let (ox, oy) = (letterbox.pad_x as u32, letterbox.pad_y as u32);
    let size = INPUT_SIZE as usize;
    let plane = |y: usize, x: usize| -> f32 {
        let (x, y) = (x as u32, y as u32);
        let pixel = if x >= ox && y >= oy && x < ox + new_w && y < oy + new_h {
            resized.get_pixel(x - ox, y - oy)[0] as f32
        } else {
            PIXEL_MEAN
        };
        (pixel - PIXEL_MEAN) / PIXEL_STD
    };
    // Luma replicated into all three channels.
    let tensor = Array4::from_shape_fn((1, 3, size, size), |(_, _, y, x)| plane(y, x));

    (tensor, letterbox)
}

/// Map output tensor names onto per-stride (score, bbox, kps) positions.
///
/// Exports either name their heads `score_8`, `bbox_16`, `kps_32`, ... or use
/// opaque numeric names in the standard order: scores, boxes, keypoints,
/// each for strides 8/16/32.
fn head_indices(names: &[String]) -> [HeadIndices; 3] {
    let position = |prefix: &str, stride: u32| {
        let wanted = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let named: Option<Vec<HeadIndices>> = STRIDES
        .iter()
        .map(|&s| Some((position("score", s)?, position("bbox", s)?, position("kps", s)?)))
        .collect();

    match named {
        Some(heads) => [heads[0], heads[1], heads[2]],
        None => [(0, 3, 6), (1, 4, 7), (2, 5, 8)],
    }
}

/// Raw outputs of one stride level.
struct StrideHead<'a> {
    stride: u32,
    scores: &'a [f32],
    boxes: &'a [f32],
    keypoints: &'a [f32],
}

impl StrideHead<'_> {
    fn decode(&self, letterbox: &Letterbox, threshold: f32) -> Vec<BoundingBox> {
        let cells = (INPUT_SIZE / self.stride) as usize;
        let stride = self.stride as f32;
        let anchors = cells * cells * ANCHORS_PER_CELL;

        (0..anchors)
            .filter_map(|idx| {
                let score = *self.scores.get(idx)?;
                if score <= threshold {
                    return None;
                }
                let cell = idx / ANCHORS_PER_CELL;
                let cx = (cell % cells) as f32 * stride;
                let cy = (cell / cells) as f32 * stride;

                let d = self.boxes.get(idx * 4..idx * 4 + 4)?;
                let (x1, y1) = letterbox.to_frame((cx - d[0] * stride, cy - d[1] * stride));
                let (x2, y2) = letterbox.to_frame((cx + d[2] * stride, cy + d[3] * stride));

                let keypoints = self.keypoints.get(idx * 10..idx * 10 + 10).map(|k| {
                    std::array::from_fn(|i| {
                        letterbox.to_frame((cx + k[i * 2] * stride, cy + k[i * 2 + 1] * stride))
                    })
                });

                Some(BoundingBox {
                    x: x1,
                    y: y1,
                    width: x2 - x1,
                    height: y2 - y1,
                    confidence: score,
                    keypoints,
                })
            })
            .collect()
    }
}

/// Greedy non-maximum suppression, result sorted by confidence.
fn suppress(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: conf, keypoints: None }
    }

    #[test]
    fn test_suppress_overlapping() {
        let faces = suppress(
            vec![
                make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
                make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
                make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
            ],
            0.4,
        );
        assert_eq!(faces.len(), 2);
        assert!((faces[0].confidence - 0.9).abs() < 1e-6);
        assert!((faces[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_suppress_empty() {
        assert!(suppress(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_maps_back_to_frame() {
        let lb = Letterbox::fit(320, 240);
        assert!((lb.scale - 2.0).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 80.0);

        let (x, y) = lb.to_frame((100.0 * lb.scale + lb.pad_x, 50.0 * lb.scale + lb.pad_y));
        assert!((x - 100.0).abs() < 1e-3 && (y - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_preprocess_shape_and_padding() {
        let image = GrayImage::from_pixel(320, 240, Luma([255]));
        let (tensor, lb) = preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        // padding rows normalise to zero
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        // content rows carry the (normalised) pixel value
        let inside = tensor[[0, 1, lb.pad_y as usize + 10, 10]];
        assert!((inside - (255.0 - PIXEL_MEAN) / PIXEL_STD).abs() < 0.01);
    }

    #[test]
    fn test_head_indices_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32",
            "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(head_indices(&names), [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_head_indices_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i| (440 + i).to_string()).collect();
        assert_eq!(head_indices(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_decode_single_anchor() {
        // stride 32 → 20×20 cells, 800 anchors; light up anchor 0 of cell (1, 1).
        let cells = 20usize;
        let anchors = cells * cells * ANCHORS_PER_CELL;
        let idx = (cells + 1) * ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        scores[idx] = 0.9;
        let mut boxes = vec![0.0f32; anchors * 4];
        boxes[idx * 4..idx * 4 + 4].copy_from_slice(&[0.5, 0.5, 0.5, 0.5]);
        let keypoints = vec![0.0f32; anchors * 10];

        let head = StrideHead { stride: 32, scores: &scores, boxes: &boxes, keypoints: &keypoints };
        let identity = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let faces = head.decode(&identity, 0.5);

        assert_eq!(faces.len(), 1);
        let face = &faces[0];
        assert!((face.x - 16.0).abs() < 1e-4 && (face.y - 16.0).abs() < 1e-4);
        assert!((face.width - 32.0).abs() < 1e-4 && (face.height - 32.0).abs() < 1e-4);
        assert_eq!(face.keypoints.unwrap()[0], (32.0, 32.0));
    }
}
