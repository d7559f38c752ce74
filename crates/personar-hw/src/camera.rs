//! V4L2 camera capture via the `v4l` crate.
//!
//! A [`CameraSession`] owns the device and its streaming buffers; dropping
//! it stops the stream and closes the device.

use crate::frame::{self, Frame};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Resolution requested from the driver; it may negotiate something smaller.
pub const IDEAL_WIDTH: u32 = 1920;
pub const IDEAL_HEIGHT: u32 = 1080;

const STREAM_BUFFERS: u32 = 4;
const ENODEV: i32 = 19;
const MAX_VIDEO_NODES: usize = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("no camera available")]
    NoDevice,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device disconnected: {0}")]
    Disconnected(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("not a video capture device")]
    StreamingNotSupported,
    #[error("frame: {0}")]
    Frame(#[from] frame::FrameError),
}

/// A discovered V4L2 capture device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub path: String,
    /// Human-readable card name, used by the selection heuristic.
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Motion-JPEG, one compressed image per buffer.
    Mjpeg,
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"MJPG" => Some(PixelFormat::Mjpeg),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"GREY" => Some(PixelFormat::Grey),
            b"Y16 " | b"Y16\0" => Some(PixelFormat::Y16),
            _ => None,
        }
    }
}

/// An open camera streaming frames.
pub struct CameraSession {
    stream: MmapStream<'static>,
    // Kept open for the lifetime of the stream.
    _device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub pixel_format: PixelFormat,
}

impl CameraSession {
    /// Open `device_path` and start streaming at (up to) 1920×1080.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.raw_os_error() == Some(16) || e.to_string().contains("busy") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }
        tracing::info!(device = device_path, card = %caps.card, driver = %caps.driver, "opened camera");

        let (width, height, pixel_format) = negotiate(&device)?;

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        tracing::info!(width, height, format = ?pixel_format, "camera streaming");

        Ok(Self {
            stream,
            _device: device,
            width,
            height,
            device_path: device_path.to_string(),
            pixel_format,
        })
    }

    /// Stop this stream completely, then open `device_path`.
    pub fn switch(self, device_path: &str) -> Result<Self, CameraError> {
        tracing::info!(from = %self.device_path, to = device_path, "switching camera");
        drop(self);
        Self::open(device_path)
    }

    /// Dequeue the next frame and convert it to grayscale.
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let device_path = &self.device_path;
        let (buf, meta) = self.stream.next().map_err(|e| {
            if e.raw_os_error() == Some(ENODEV) {
                CameraError::Disconnected(device_path.clone())
            } else {
                CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}"))
            }
        })?;
        let used = (meta.bytesused as usize).min(buf.len());
        let sequence = meta.sequence;

        let (data, width, height) = match self.pixel_format {
            PixelFormat::Mjpeg => frame::mjpeg_to_grayscale(&buf[..used])?,
            PixelFormat::Yuyv => (frame::yuyv_to_grayscale(buf, self.width, self.height)?, self.width, self.height),
            PixelFormat::Grey => (frame::grey_to_grayscale(buf, self.width, self.height)?, self.width, self.height),
            PixelFormat::Y16 => (frame::y16_to_grayscale(buf, self.width, self.height)?, self.width, self.height),
        };

        Ok(Frame {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }

    /// List V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_VIDEO_NODES)
            .filter_map(|i| {
                let path = format!("/dev/video{i}");
                if !Path::new(&path).exists() {
                    return None;
                }
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                    return None;
                }
                Some(DeviceInfo {
                    path,
                    name: caps.card,
                    driver: caps.driver,
                    bus: caps.bus,
                })
            })
            .collect()
    }
}

impl CameraError {
    /// Whether the device is gone and no further frame can arrive.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CameraError::Disconnected(_) | CameraError::DeviceNotFound(_) | CameraError::NoDevice
        )
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        tracing::info!(device = %self.device_path, "camera released");
    }
}

/// Ask for MJPG at the ideal size, then YUYV; accept whatever grayscale-capable
/// format the driver settles on.
fn negotiate(device: &Device) -> Result<(u32, u32, PixelFormat), CameraError> {
    let mut last = None;
    for wanted in [b"MJPG", b"YUYV"] {
        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(wanted);
        fmt.width = IDEAL_WIDTH;
        fmt.height = IDEAL_HEIGHT;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;
        if let Some(pf) = PixelFormat::from_fourcc(negotiated.fourcc) {
            return Ok((negotiated.width, negotiated.height, pf));
        }
        last = Some(negotiated.fourcc);
    }
    Err(CameraError::FormatNegotiationFailed(format!(
        "unsupported pixel format: {last:?} (need MJPG, YUYV, GREY or Y16)"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), Some(PixelFormat::Grey));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"Y16 ")), Some(PixelFormat::Y16));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"NV12")), None);
    }

    #[test]
    fn test_fatal_errors() {
        assert!(CameraError::Disconnected("/dev/video0".into()).is_fatal());
        assert!(CameraError::DeviceNotFound("/dev/video9".into()).is_fatal());
        assert!(!CameraError::CaptureFailed("timeout".into()).is_fatal());
        assert!(!CameraError::Frame(frame::FrameError::Decode("bad jpeg".into())).is_fatal());
    }

    #[test]
    fn test_open_missing_device() {
        assert!(matches!(
            CameraSession::open("/dev/video-does-not-exist"),
            Err(CameraError::DeviceNotFound(_))
        ));
    }
}
