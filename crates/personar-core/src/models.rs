//! Model loading and the combined detect → landmarks → descriptor pipeline.

use crate::descriptor::{DescriptorError, DescriptorExtractor};
use crate::detector::{DetectorError, FaceDetector};
use crate::landmarks::{LandmarkError, LandmarkEstimator};
use crate::types::{BoundingBox, Detection};
use image::GrayImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DETECTOR_FILE: &str = "det_10g.onnx";
pub const LANDMARKS_FILE: &str = "2d106det.onnx";
pub const DESCRIPTOR_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmarks: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("model loader task failed: {0}")]
    Join(String),
}

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmarks: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
}

/// Finds faces in an image and describes each of them.
pub trait FaceAnalyzer {
    /// All faces in the image, most confident first.
    fn analyze(&mut self, image: &GrayImage) -> Result<Vec<Detection>, AnalyzerError>;

    /// The most confident face only, or `None` if there is no face.
    fn analyze_single(&mut self, image: &GrayImage) -> Result<Option<Detection>, AnalyzerError> {
        Ok(self.analyze(image)?.into_iter().next())
    }
}

/// Locations of the three weight files.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub landmarks: PathBuf,
    pub descriptor: PathBuf,
}

impl ModelPaths {
    /// The standard file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join(DETECTOR_FILE),
            landmarks: dir.join(LANDMARKS_FILE),
            descriptor: dir.join(DESCRIPTOR_FILE),
        }
    }
}

/// The three loaded networks.
pub struct FaceModels {
    detector: FaceDetector,
    landmarks: LandmarkEstimator,
    descriptor: DescriptorExtractor,
}

/// Load all three models concurrently on the blocking pool.
///
/// Resolves only once every session is ready; the first failure is returned.
pub async fn load_models(paths: &ModelPaths) -> Result<FaceModels, ModelError> {
    let (det, lmk, desc) = (
        paths.detector.clone(),
        paths.landmarks.clone(),
        paths.descriptor.clone(),
    );

    let (detector, landmarks, descriptor) = tokio::try_join!(
        blocking(move || Ok(FaceDetector::load(&det)?)),
        blocking(move || Ok(LandmarkEstimator::load(&lmk)?)),
        blocking(move || Ok(DescriptorExtractor::load(&desc)?)),
    )?;

    tracing::info!("face models loaded");
    Ok(FaceModels { detector, landmarks, descriptor })
}

async fn blocking<T, F>(load: F) -> Result<T, ModelError>
where
    F: FnOnce() -> Result<T, ModelError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(load)
        .await
        .map_err(|e| ModelError::Join(e.to_string()))?
}

impl FaceModels {
    fn describe(&mut self, image: &GrayImage, bbox: BoundingBox) -> Result<Detection, AnalyzerError> {
        let landmarks = self.landmarks.estimate(image, &bbox)?;
        let embedding = self.descriptor.extract(image, &bbox)?;
        Ok(Detection { bbox, landmarks, embedding })
    }
}

impl FaceAnalyzer for FaceModels {
    fn analyze(&mut self, image: &GrayImage) -> Result<Vec<Detection>, AnalyzerError> {
        let faces = self.detector.detect(image)?;
        Ok(describe_each(faces, |bbox| self.describe(image, bbox)))
    }

    fn analyze_single(&mut self, image: &GrayImage) -> Result<Option<Detection>, AnalyzerError> {
        let faces = self.detector.detect(image)?;
        if faces.len() > 1 {
            tracing::debug!(faces = faces.len(), "several faces in reference image, using the most confident");
        }
        match faces.into_iter().find(|f| f.keypoints.is_some()) {
            Some(bbox) => self.describe(image, bbox).map(Some),
            None => Ok(None),
        }
    }
}

/// Describe every face that has keypoints. A face whose landmark or
/// descriptor pass fails is logged and left out; the others are kept.
fn describe_each<F>(faces: Vec<BoundingBox>, mut describe: F) -> Vec<Detection>
where
    F: FnMut(BoundingBox) -> Result<Detection, AnalyzerError>,
{
    faces
        .into_iter()
        .filter(|f| f.keypoints.is_some())
        .enumerate()
        .filter_map(|(index, bbox)| match describe(bbox) {
            Ok(detection) => Some(detection),
            Err(e) => {
                tracing::warn!(face = index, error = %e, "skipping face");
                None
            }
        })
        .collect()
}
