//! personar-hw — camera capture and device selection.

pub mod camera;
pub mod frame;
pub mod select;

pub use camera::{CameraError, CameraSession, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
pub use select::{preferred_device, resolve_device};
