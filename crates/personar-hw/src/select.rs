//! Default camera choice.
//!
//! Phone-bridge cameras (DroidCam, EpocCam, iVCam and friends) are usually
//! the user's rear phone camera and make the best AR source, so they win.
//! Then anything that calls itself back/rear/environment-facing, then
//! whatever came first.

use crate::camera::{CameraError, DeviceInfo};

const BRIDGE_HINTS: &[&str] = &[
    "droidcam",
    "epoccam",
    "ivcam",
    "ip webcam",
    "phone",
    "mobile",
    "wifi",
];

const REAR_HINTS: &[&str] = &["back", "rear", "environment"];

fn name_has(device: &DeviceInfo, hints: &[&str]) -> bool {
    let name = device.name.to_lowercase();
    hints.iter().any(|h| name.contains(h))
}

/// Pick the default device out of `devices` (enumeration order).
pub fn preferred_device(devices: &[DeviceInfo]) -> Option<&DeviceInfo> {
    devices
        .iter()
        .find(|d| name_has(d, BRIDGE_HINTS))
        .or_else(|| devices.iter().find(|d| name_has(d, REAR_HINTS)))
        .or_else(|| devices.first())
}

/// Resolve the camera to open: an explicit path wins, else the heuristic.
pub fn resolve_device(explicit: Option<&str>, devices: &[DeviceInfo]) -> Result<String, CameraError> {
    if let Some(path) = explicit {
        return Ok(path.to_string());
    }
    let chosen = preferred_device(devices).ok_or(CameraError::NoDevice)?;
    tracing::info!(device = %chosen.path, name = %chosen.name, "selected camera");
    Ok(chosen.path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(path: &str, name: &str) -> DeviceInfo {
        DeviceInfo {
            path: path.into(),
            name: name.into(),
            driver: "uvcvideo".into(),
            bus: "usb".into(),
        }
    }

    #[test]
    fn test_bridge_camera_wins() {
        let devices = vec![
            dev("/dev/video0", "Integrated Camera"),
            dev("/dev/video2", "Back Camera"),
            dev("/dev/video4", "DroidCam Source"),
        ];
        assert_eq!(preferred_device(&devices).unwrap().path, "/dev/video4");
    }

    #[test]
    fn test_rear_camera_second() {
        let devices = vec![
            dev("/dev/video0", "Integrated Camera"),
            dev("/dev/video2", "Environment facing"),
        ];
        assert_eq!(preferred_device(&devices).unwrap().path, "/dev/video2");
    }

    #[test]
    fn test_first_device_fallback() {
        let devices = vec![dev("/dev/video0", "HD Webcam"), dev("/dev/video1", "HD Webcam")];
        assert_eq!(preferred_device(&devices).unwrap().path, "/dev/video0");
    }

    #[test]
    fn test_case_insensitive() {
        let devices = vec![dev("/dev/video0", "Webcam"), dev("/dev/video1", "IVCAM")];
        assert_eq!(preferred_device(&devices).unwrap().path, "/dev/video1");
    }

    #[test]
    fn test_no_devices() {
        assert!(preferred_device(&[]).is_none());
        assert!(matches!(resolve_device(None, &[]), Err(CameraError::NoDevice)));
    }

    #[test]
    fn test_explicit_device_wins() {
        let devices = vec![dev("/dev/video4", "DroidCam")];
        assert_eq!(resolve_device(Some("/dev/video9"), &devices).unwrap(), "/dev/video9");
    }
}
