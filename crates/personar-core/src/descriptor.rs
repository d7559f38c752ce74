//! ArcFace descriptor extractor via ONNX Runtime.
//!
//! Aligns each face to the 112×112 template and returns an L2-normalised
//! embedding (512 values for `w600k_r50`).

use crate::alignment;
use crate::types::{BoundingBox, Embedding};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 127.5;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no keypoints; alignment needs the detector's five points")]
    NoKeypoints,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct DescriptorExtractor {
    session: Session,
}

impl DescriptorExtractor {
    pub fn load(model_path: &Path) -> Result<Self, DescriptorError> {
        if !model_path.exists() {
            return Err(DescriptorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Compute the descriptor of one detected face.
    pub fn extract(
        &mut self,
        image: &GrayImage,
        face: &BoundingBox,
    ) -> Result<Embedding, DescriptorError> {
        let keypoints = face.keypoints.as_ref().ok_or(DescriptorError::NoKeypoints)?;
        let aligned = alignment::align_face(image, keypoints);
        let input = to_tensor(&aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DescriptorError::InferenceFailed(format!("embedding: {e}")))?;

        if raw.is_empty() {
            return Err(DescriptorError::InferenceFailed("empty embedding".into()));
        }
        Ok(Embedding::new(l2_normalize(raw)))
    }
}

fn to_tensor(aligned: &GrayImage) -> Array4<f32> {
    let (w, h) = (aligned.width() as usize, aligned.height() as usize);
    Array4::from_shape_fn((1, 3, h, w), |(_, _, y, x)| {
        (aligned.get_pixel(x as u32, y as u32)[0] as f32 - PIXEL_MEAN) / PIXEL_STD
    })
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|v| v / norm).collect()
    } else {
        raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_to_tensor_normalisation() {
        let aligned = GrayImage::from_pixel(112, 112, Luma([255]));
        let tensor = to_tensor(&aligned);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
        assert!((tensor[[0, 2, 5, 7]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor[[0, 0, 5, 7]], tensor[[0, 1, 5, 7]]);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
