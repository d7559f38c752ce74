//! Known-face registry: reference descriptors grouped by identity label.

use crate::models::FaceAnalyzer;
use crate::source::ReferenceImage;
use crate::types::{Embedding, LabeledDescriptors};
use std::path::Path;

/// Fallback reference photos per label: `<dir>/<label>/1.jpg` .. `3.jpg`.
pub const FALLBACK_IMAGES_PER_LABEL: usize = 3;

/// Reference photos of one identity.
#[derive(Debug, Clone)]
pub struct IdentitySources {
    pub label: String,
    pub images: Vec<ReferenceImage>,
}

/// Captured onboarding photos when there are any, otherwise the
/// `known_faces/<label>/<n>.jpg` files.
pub fn reference_images(known_faces_dir: &Path, label: &str, captured: &[String]) -> Vec<ReferenceImage> {
    let captured: Vec<ReferenceImage> = captured
        .iter()
        .filter(|url| !url.is_empty())
        .cloned()
        .map(ReferenceImage::Inline)
        .collect();
    if !captured.is_empty() {
        return captured;
    }
    (1..=FALLBACK_IMAGES_PER_LABEL)
        .map(|n| ReferenceImage::File(known_faces_dir.join(label).join(format!("{n}.jpg"))))
        .collect()
}

/// Labelled reference descriptors, one entry per matchable identity.
#[derive(Debug, Clone, Default)]
pub struct FaceRegistry {
    entries: Vec<LabeledDescriptors>,
}

impl FaceRegistry {
    pub fn new(entries: Vec<LabeledDescriptors>) -> Self {
        Self {
            entries: entries.into_iter().filter(|e| !e.descriptors.is_empty()).collect(),
        }
    }

    pub fn entries(&self) -> &[LabeledDescriptors] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }

    pub fn get(&self, label: &str) -> Option<&LabeledDescriptors> {
        self.entries.iter().find(|e| e.label == label)
    }
}

/// Embed every reference image of every identity.
///
/// Images that fail to load, fail analysis or contain no face are logged and
/// skipped. Identities left without any descriptor are omitted.
pub fn build_registry<A: FaceAnalyzer + ?Sized>(
    analyzer: &mut A,
    identities: &[IdentitySources],
) -> FaceRegistry {
    let mut entries = Vec::with_capacity(identities.len());

    for identity in identities {
        let descriptors: Vec<Embedding> = identity
            .images
            .iter()
            .filter_map(|source| embed_reference(analyzer, &identity.label, source))
            .collect();

        if descriptors.is_empty() {
            tracing::warn!(label = %identity.label, "no usable reference image; identity cannot be matched");
            continue;
        }
        tracing::debug!(label = %identity.label, descriptors = descriptors.len(), "identity registered");
        entries.push(LabeledDescriptors {
            label: identity.label.clone(),
            descriptors,
        });
    }

    tracing::info!(identities = entries.len(), "face registry built");
    FaceRegistry { entries }
}

fn embed_reference<A: FaceAnalyzer + ?Sized>(
    analyzer: &mut A,
    label: &str,
    source: &ReferenceImage,
) -> Option<Embedding> {
    let image = match source.load() {
        Ok(image) => image,
        Err(e) => {
            tracing::warn!(label, %source, error = %e, "skipping reference image");
            return None;
        }
    };
    match analyzer.analyze_single(&image) {
        Ok(Some(detection)) => Some(detection.embedding),
        Ok(None) => {
            tracing::warn!(label, %source, "no face in reference image");
            None
        }
        Err(e) => {
            tracing::warn!(label, %source, error = %e, "reference image analysis failed");
            None
        }
    }
}
