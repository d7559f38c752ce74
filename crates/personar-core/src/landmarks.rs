//! 106-point facial landmark estimator (InsightFace `2d106det`) via ONNX Runtime.
//!
//! Crops a square around the detected box, runs the regression network and
//! maps the normalised points back into frame coordinates.

use crate::alignment::{self, Similarity};
use crate::types::BoundingBox;
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: u32 = 192;
/// Crop side relative to the longer side of the face box.
const CROP_MARGIN: f32 = 1.5;
const POINT_COUNT: usize = 106;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct LandmarkEstimator {
    session: Session,
}

impl LandmarkEstimator {
    pub fn load(model_path: &Path) -> Result<Self, LandmarkError> {
        if !model_path.exists() {
            return Err(LandmarkError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded landmark model"
        );

        Ok(Self { session })
    }

    /// Estimate the 106 landmark points of one face, in frame coordinates.
    pub fn estimate(
        &mut self,
        image: &GrayImage,
        face: &BoundingBox,
    ) -> Result<Vec<(f32, f32)>, LandmarkError> {
        let crop = crop_transform(face);
        let patch = alignment::warp(image, &crop, INPUT_SIZE);
        let input = to_tensor(&patch);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(format!("landmarks: {e}")))?;

        decode_points(raw, &crop)
    }
}

/// Scale+shift that puts the box centre in the middle of the crop.
fn crop_transform(face: &BoundingBox) -> Similarity {
    let side = face.width.max(face.height) * CROP_MARGIN;
    let scale = if side > 0.0 { INPUT_SIZE as f32 / side } else { 1.0 };
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;
    let half = INPUT_SIZE as f32 / 2.0;
    Similarity::scale_shift(scale, half - cx * scale, half - cy * scale)
}

fn to_tensor(patch: &GrayImage) -> Array4<f32> {
    let size = INPUT_SIZE as usize;
    // The exported graph normalises internally; feed raw intensities.
    Array4::from_shape_fn((1, 3, size, size), |(_, _, y, x)| {
        patch.get_pixel(x as u32, y as u32)[0] as f32
    })
}

/// Network output is 212 values in [-1, 1] relative to the crop.
fn decode_points(raw: &[f32], crop: &Similarity) -> Result<Vec<(f32, f32)>, LandmarkError> {
    if raw.len() < POINT_COUNT * 2 {
        return Err(LandmarkError::InferenceFailed(format!(
            "expected {} values, got {}",
            POINT_COUNT * 2,
            raw.len()
        )));
    }
    let half = INPUT_SIZE as f32 / 2.0;
    raw[..POINT_COUNT * 2]
        .chunks_exact(2)
        .map(|p| {
            let in_crop = ((p[0] + 1.0) * half, (p[1] + 1.0) * half);
            crop.invert(in_crop)
                .ok_or_else(|| LandmarkError::InferenceFailed("degenerate crop".into()))
        })
        .collect()
}
