//! personar-core — face detection, landmarks, descriptors and matching.
//!
//! SCRFD finds faces, the 2d106det network places landmarks and ArcFace
//! produces descriptors, all through ONNX Runtime on the CPU. On top of
//! that sit the known-face registry, the nearest-neighbour matcher and the
//! per-frame recognizer.

pub mod alignment;
pub mod descriptor;
pub mod detector;
pub mod landmarks;
pub mod matcher;
pub mod models;
pub mod recognize;
pub mod registry;
pub mod source;
pub mod types;

pub use matcher::{FaceMatcher, MatcherError, DEFAULT_DISTANCE_THRESHOLD};
pub use models::{load_models, AnalyzerError, FaceAnalyzer, FaceModels, ModelError, ModelPaths};
pub use recognize::recognize_faces;
pub use registry::{build_registry, reference_images, FaceRegistry, IdentitySources};
pub use source::ReferenceImage;
pub use types::{
    BoundingBox, Detection, Embedding, FaceMatch, LabeledDescriptors, MatchLabel, RecognizedFace,
};

/// Default model directory: `$PERSONAR_MODEL_DIR`, else `./models`.
pub fn default_model_dir() -> std::path::PathBuf {
    std::env::var("PERSONAR_MODEL_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("models"))
}
