//! Reference image sources: files on disk or inline `data:` URLs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::GrayImage;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageSourceError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("decode: {0}")]
    Decode(#[from] image::ImageError),
    #[error("not a base64 data URL: {0}")]
    DataUrl(String),
    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// One reference photo of an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceImage {
    File(PathBuf),
    /// `data:image/<type>;base64,<payload>` as produced by onboarding capture.
    Inline(String),
}

impl ReferenceImage {
    /// Decode into a grayscale image.
    pub fn load(&self) -> Result<GrayImage, ImageSourceError> {
        match self {
            ReferenceImage::File(path) => load_file(path),
            ReferenceImage::Inline(url) => decode_data_url(url),
        }
    }
}

impl fmt::Display for ReferenceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceImage::File(path) => write!(f, "{}", path.display()),
            ReferenceImage::Inline(url) => write!(f, "inline image ({} bytes)", url.len()),
        }
    }
}

pub fn load_file(path: &Path) -> Result<GrayImage, ImageSourceError> {
    let bytes = std::fs::read(path).map_err(|source| ImageSourceError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(image::load_from_memory(&bytes)?.to_luma8())
}

pub fn decode_data_url(url: &str) -> Result<GrayImage, ImageSourceError> {
    let bytes = data_url_bytes(url)?;
    Ok(image::load_from_memory(&bytes)?.to_luma8())
}

/// Payload bytes of a base64 `data:` URL.
pub fn data_url_bytes(url: &str) -> Result<Vec<u8>, ImageSourceError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ImageSourceError::DataUrl(truncate(url)))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImageSourceError::DataUrl(truncate(url)))?;
    if !meta.ends_with(";base64") {
        return Err(ImageSourceError::DataUrl(truncate(url)));
    }
    Ok(STANDARD.decode(payload.trim())?)
}

/// Encode raw image bytes as a `data:` URL.
pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

fn truncate(s: &str) -> String {
    s.chars().take(32).collect()
}
