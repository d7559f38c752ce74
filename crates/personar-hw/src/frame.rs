//! Frame type and pixel-format conversion to grayscale.

use image::{GrayImage, ImageFormat};

/// A captured grayscale camera frame at native sensor resolution.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// View the frame as an `image` buffer.
    pub fn to_image(&self) -> Result<GrayImage, FrameError> {
        GrayImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            FrameError::InvalidLength {
                expected: (self.width * self.height) as usize,
                actual: self.data.len(),
            },
        )
    }
}

/// Extract the Y channel of packed YUYV 4:2:2 (`[Y0, U, Y1, V]`).
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength { expected, actual: yuyv.len() });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Downscale 16-bit little-endian luma to 8 bits.
pub fn y16_to_grayscale(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if buf.len() < expected {
        return Err(FrameError::InvalidLength { expected, actual: buf.len() });
    }
    // high byte of each little-endian sample
    Ok(buf[..expected].chunks_exact(2).map(|px| px[1]).collect())
}

pub fn grey_to_grayscale(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height) as usize;
    if buf.len() < expected {
        return Err(FrameError::InvalidLength { expected, actual: buf.len() });
    }
    Ok(buf[..expected].to_vec())
}

/// Decode one Motion-JPEG frame. Returns the decoded size with the pixels.
pub fn mjpeg_to_grayscale(jpeg: &[u8]) -> Result<(Vec<u8>, u32, u32), FrameError> {
    let decoded = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
        .map_err(|e| FrameError::Decode(e.to_string()))?
        .to_luma8();
    let (w, h) = decoded.dimensions();
    Ok((decoded.into_raw(), w, h))
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("MJPEG decode failed: {0}")]
    Decode(String),
}
