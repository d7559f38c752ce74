//! Per-frame recognition: analyse every face, match each against the registry.

use crate::matcher::FaceMatcher;
use crate::models::{AnalyzerError, FaceAnalyzer};
use crate::types::RecognizedFace;
use image::GrayImage;

/// Recognise all faces in one frame. No state is kept between calls.
pub fn recognize_faces<A: FaceAnalyzer + ?Sized>(
    analyzer: &mut A,
    image: &GrayImage,
    matcher: &FaceMatcher,
) -> Result<Vec<RecognizedFace>, AnalyzerError> {
    let detections = analyzer.analyze(image)?;

    Ok(detections
        .into_iter()
        .map(|det| {
            let found = matcher.find_best_match(&det.embedding);
            tracing::debug!(label = %found.label, distance = found.distance, "face matched");
            RecognizedFace {
                bbox: det.bbox,
                landmarks: det.landmarks,
                label: found.label,
                distance: found.distance,
            }
        })
        .collect())
}
