//! Nearest-neighbour face matcher over the registry.

use crate::registry::FaceRegistry;
use crate::types::{Embedding, FaceMatch, MatchLabel};
use thiserror::Error;

/// Acceptance distance used when the caller does not supply one.
///
/// Descriptors are unit vectors, so distance is `sqrt(2 - 2 cos)`; 1.1
/// accepts pairs with cosine similarity above roughly 0.4.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 1.1;

#[derive(Error, Debug, PartialEq)]
pub enum MatcherError {
    #[error("registry has no reference descriptors")]
    EmptyRegistry,
    #[error("descriptor for {label} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
}

/// Immutable matcher; rebuild a new one when the registry changes.
#[derive(Debug, Clone)]
pub struct FaceMatcher {
    registry: FaceRegistry,
    threshold: f32,
    dim: usize,
}

impl FaceMatcher {
    pub fn new(registry: FaceRegistry, threshold: f32) -> Result<Self, MatcherError> {
        let dim = registry
            .entries()
            .iter()
            .flat_map(|e| e.descriptors.first())
            .map(Embedding::dim)
            .next()
            .ok_or(MatcherError::EmptyRegistry)?;

        for entry in registry.entries() {
            if let Some(bad) = entry.descriptors.iter().find(|d| d.dim() != dim) {
                return Err(MatcherError::DimensionMismatch {
                    label: entry.label.clone(),
                    expected: dim,
                    actual: bad.dim(),
                });
            }
        }

        Ok(Self { registry, threshold, dim })
    }

    pub fn with_default_threshold(registry: FaceRegistry) -> Result<Self, MatcherError> {
        Self::new(registry, DEFAULT_DISTANCE_THRESHOLD)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn registry(&self) -> &FaceRegistry {
        &self.registry
    }

    /// Label owning the nearest reference descriptor, and that distance.
    ///
    /// The label is [`MatchLabel::Unknown`] unless the distance is strictly
    /// below the threshold.
    pub fn find_best_match(&self, probe: &Embedding) -> FaceMatch {
        let nearest = self
            .registry
            .entries()
            .iter()
            .flat_map(|entry| {
                entry
                    .descriptors
                    .iter()
                    .map(move |d| (entry.label.as_str(), probe.euclidean_distance(d)))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((label, distance)) if distance < self.threshold => FaceMatch {
                label: MatchLabel::Known(label.to_string()),
                distance,
            },
            Some((_, distance)) => FaceMatch { label: MatchLabel::Unknown, distance },
            None => FaceMatch { label: MatchLabel::Unknown, distance: f32::INFINITY },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LabeledDescriptors;

    fn entry(label: &str, descriptors: &[&[f32]]) -> LabeledDescriptors {
        LabeledDescriptors {
            label: label.into(),
            descriptors: descriptors.iter().map(|d| Embedding::new(d.to_vec())).collect(),
        }
    }

    fn matcher(threshold: f32) -> FaceMatcher {
        FaceMatcher::new(
            FaceRegistry::new(vec![
                entry("Jun", &[&[0.0, 0.0], &[10.0, 10.0]]),
                entry("Khoi", &[&[1.0, 0.0]]),
            ]),
            threshold,
        )
        .unwrap()
    }

    #[test]
    fn test_nearest_descriptor_wins() {
        // Jun's mean distance is large, but its first descriptor is nearest.
        let m = matcher(0.6);
        let result = m.find_best_match(&Embedding::new(vec![0.1, 0.0]));
        assert_eq!(result.label, MatchLabel::Known("Jun".into()));
        assert!((result.distance - 0.1).abs() < 1e-6);

        let result = m.find_best_match(&Embedding::new(vec![0.9, 0.0]));
        assert_eq!(result.label, MatchLabel::Known("Khoi".into()));
    }

    #[test]
    fn test_over_threshold_is_unknown() {
        let m = matcher(0.6);
        let result = m.find_best_match(&Embedding::new(vec![0.5, 3.0]));
        assert_eq!(result.label, MatchLabel::Unknown);
        assert!(result.distance >= 0.6);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let m = matcher(0.5);
        let result = m.find_best_match(&Embedding::new(vec![0.0, 0.5]));
        assert!((result.distance - 0.5).abs() < 1e-6);
        assert_eq!(result.label, MatchLabel::Unknown);
    }

    #[test]
    fn test_empty_registry_rejected() {
        let err = FaceMatcher::with_default_threshold(FaceRegistry::default()).unwrap_err();
        assert_eq!(err, MatcherError::EmptyRegistry);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let registry = FaceRegistry::new(vec![
            entry("Jun", &[&[0.0, 0.0]]),
            entry("Owen", &[&[0.0, 0.0, 0.0]]),
        ]);
        assert!(matches!(
            FaceMatcher::new(registry, 0.6),
            Err(MatcherError::DimensionMismatch { actual: 3, expected: 2, .. })
        ));
    }

    /// Unit vector at `cos` similarity to `[1, 0, ..]`.
    fn at_cosine(cos: f32, dim: usize) -> Embedding {
        let mut v = vec![0.0; dim];
        v[0] = cos;
        v[1] = (1.0 - cos * cos).sqrt();
        Embedding::new(v)
    }

    #[test]
    fn test_default_accepts_typical_same_person_pair() {
        let mut reference = vec![0.0; 512];
        reference[0] = 1.0;
        let m = FaceMatcher::with_default_threshold(FaceRegistry::new(vec![LabeledDescriptors {
            label: "Khoi".into(),
            descriptors: vec![Embedding::new(reference)],
        }]))
        .unwrap();

        // same person, cosine 0.6: distance ~0.894
        let same = m.find_best_match(&at_cosine(0.6, 512));
        assert_eq!(same.label, MatchLabel::Known("Khoi".into()));
        assert!((same.distance - 0.894).abs() < 1e-3);

        // unrelated face, cosine 0.1: distance ~1.342
        let other = m.find_best_match(&at_cosine(0.1, 512));
        assert_eq!(other.label, MatchLabel::Unknown);
    }

    #[test]
    fn test_default_threshold() {
        let m = FaceMatcher::with_default_threshold(FaceRegistry::new(vec![entry("a", &[&[1.0]])])).unwrap();
        assert_eq!(m.threshold(), DEFAULT_DISTANCE_THRESHOLD);
        assert_eq!(m.dim(), 1);
    }
}
