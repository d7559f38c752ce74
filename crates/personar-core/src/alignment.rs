//! Similarity warps used to cut normalised face crops out of a frame.
//!
//! The recognizer aligns the five detector keypoints onto the ArcFace
//! reference template; the landmark estimator uses a plain scale+shift crop
//! around the box centre. Both go through [`Similarity`] and [`warp`].

use image::imageops::interpolate_bilinear;
use image::{GrayImage, Luma};

/// ArcFace reference keypoints for a 112×112 crop.
pub const ARCFACE_TEMPLATE_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// 4-DOF transform `dst = [[a, -b], [b, a]] * src + [tx, ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    pub const IDENTITY: Similarity = Similarity { a: 1.0, b: 0.0, tx: 0.0, ty: 0.0 };

    /// Uniform scale about the origin followed by a translation.
    pub fn scale_shift(scale: f32, tx: f32, ty: f32) -> Self {
        Self { a: scale, b: 0.0, tx, ty }
    }

    /// Closed-form least-squares fit mapping `src` points onto `dst`.
    ///
    /// Returns `None` when the source points are all coincident.
    pub fn estimate(src: &[(f32, f32)], dst: &[(f32, f32)]) -> Option<Self> {
        let n = src.len().min(dst.len());
        if n == 0 {
            return None;
        }
        let inv_n = 1.0 / n as f32;
        let (msx, msy) = src[..n]
            .iter()
            .fold((0.0, 0.0), |acc, p| (acc.0 + p.0 * inv_n, acc.1 + p.1 * inv_n));
        let (mdx, mdy) = dst[..n]
            .iter()
            .fold((0.0, 0.0), |acc, p| (acc.0 + p.0 * inv_n, acc.1 + p.1 * inv_n));

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut norm = 0.0f32;
        for (s, d) in src[..n].iter().zip(dst[..n].iter()) {
            let (sx, sy) = (s.0 - msx, s.1 - msy);
            let (dx, dy) = (d.0 - mdx, d.1 - mdy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            norm += sx * sx + sy * sy;
        }
        if norm < 1e-12 {
            return None;
        }

        let a = dot / norm;
        let b = cross / norm;
        Some(Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        })
    }

    /// Uniform scale factor of the transform.
    pub fn scale(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Map a destination point back into source coordinates.
    pub fn invert(&self, (x, y): (f32, f32)) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (dx, dy) = (x - self.tx, y - self.ty);
        Some((
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        ))
    }
}

/// Warp `image` through `transform` into a `size`×`size` crop.
///
/// Bilinear sampling; samples falling outside the source are black.
pub fn warp(image: &GrayImage, transform: &Similarity, size: u32) -> GrayImage {
    GrayImage::from_fn(size, size, |ox, oy| {
        transform
            .invert((ox as f32, oy as f32))
            .and_then(|(sx, sy)| interpolate_bilinear(image, sx, sy))
            .unwrap_or(Luma([0]))
    })
}

/// Align a face to the canonical 112×112 ArcFace crop using its keypoints.
pub fn align_face(image: &GrayImage, keypoints: &[(f32, f32); 5]) -> GrayImage {
    let transform =
        Similarity::estimate(keypoints, &ARCFACE_TEMPLATE_112).unwrap_or(Similarity::IDENTITY);
    warp(image, &transform, ALIGNED_SIZE)
}
