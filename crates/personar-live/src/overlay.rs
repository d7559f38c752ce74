//! Card placement: native-resolution face boxes to display coordinates.

use personar_core::{BoundingBox, RecognizedFace};
use personar_profile::{Profile, ProfileSnapshot};
use serde::Serialize;

/// Face widths (display px) at which the card reaches its min / max scale.
pub const MIN_FACE_WIDTH: f32 = 80.0;
pub const MAX_FACE_WIDTH: f32 = 300.0;
pub const MIN_CARD_SCALE: f32 = 0.4;
pub const MAX_CARD_SCALE: f32 = 1.2;

/// How the camera image is laid onto the display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayGeometry {
    pub display_width: u32,
    pub display_height: u32,
    pub mirror: bool,
    /// Shift applied to every card, left of the projected face.
    pub card_offset: f32,
}

/// A face box in display coordinates, before the card offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One identity card to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayPlacement {
    /// Top-left corner in display pixels.
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub label: String,
    pub distance: f32,
    pub profile: Profile,
}

impl OverlayGeometry {
    /// Scale `bbox` from a `native_width`×`native_height` frame onto the
    /// display, mirroring horizontally when enabled.
    pub fn project(&self, bbox: &BoundingBox, native_width: u32, native_height: u32) -> ProjectedBox {
        let scale_x = self.display_width as f32 / native_width.max(1) as f32;
        let scale_y = self.display_height as f32 / native_height.max(1) as f32;

        let width = bbox.width * scale_x;
        let left = bbox.x * scale_x;
        let x = if self.mirror {
            self.display_width as f32 - (left + width)
        } else {
            left
        };

        ProjectedBox {
            x,
            y: bbox.y * scale_y,
            width,
            height: bbox.height * scale_y,
        }
    }
}

/// Linear card scale over on-screen face width, clamped at both ends.
pub fn card_scale(face_width: f32) -> f32 {
    let t = (face_width - MIN_FACE_WIDTH) / (MAX_FACE_WIDTH - MIN_FACE_WIDTH);
    (MIN_CARD_SCALE + t * (MAX_CARD_SCALE - MIN_CARD_SCALE)).clamp(MIN_CARD_SCALE, MAX_CARD_SCALE)
}

/// Place a card for `face`, or `None` when the distance is not below
/// `threshold` or the label has no stored profile.
pub fn place(
    face: &RecognizedFace,
    native: (u32, u32),
    geometry: &OverlayGeometry,
    threshold: f32,
    profiles: &ProfileSnapshot,
) -> Option<OverlayPlacement> {
    if face.distance.is_nan() || face.distance >= threshold {
        return None;
    }
    let label = face.label.as_known()?;
    let profile = profiles.get(label)?;

    let projected = geometry.project(&face.bbox, native.0, native.1);
    Some(OverlayPlacement {
        x: projected.x - geometry.card_offset,
        y: projected.y,
        scale: card_scale(projected.width),
        label: label.to_string(),
        distance: face.distance,
        profile: profile.clone(),
    })
}

/// Cards for every placeable face in one frame.
pub fn place_all(
    faces: &[RecognizedFace],
    native: (u32, u32),
    geometry: &OverlayGeometry,
    threshold: f32,
    profiles: &ProfileSnapshot,
) -> Vec<OverlayPlacement> {
    faces
        .iter()
        .filter_map(|face| {
            let placed = place(face, native, geometry, threshold, profiles);
            if placed.is_none() {
                tracing::debug!(label = %face.label, distance = face.distance, "no card for face");
            }
            placed
        })
        .collect()
}
