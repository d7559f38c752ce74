use crate::overlay::OverlayGeometry;
use personar_core::ModelPaths;
use std::path::PathBuf;
use std::time::Duration;

/// Live acceptance distance; stricter than the matcher's own default.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 1.0;

/// Live view configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// V4L2 device path. `None` picks one with the selection heuristic.
    pub camera_device: Option<String>,
    /// Directory containing the three ONNX model files.
    pub model_dir: PathBuf,
    /// `<dir>/<label>/{1,2,3}.jpg` reference photos.
    pub known_faces_dir: PathBuf,
    /// Optional TOML profiles file. Seed profiles are used without one.
    pub profiles_path: Option<PathBuf>,
    /// Euclidean distance below which a face is accepted.
    pub match_threshold: f32,
    /// Minimum spacing between two recognitions.
    pub detection_interval: Duration,
    /// Display refresh tick.
    pub frame_interval: Duration,
    pub display_width: u32,
    pub display_height: u32,
    /// Horizontal shift applied to every card, in display pixels.
    pub card_offset: f32,
    /// Mirror the view horizontally (selfie view).
    pub mirror: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            camera_device: None,
            model_dir: PathBuf::from("models"),
            known_faces_dir: PathBuf::from("known_faces"),
            profiles_path: None,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            detection_interval: Duration::from_millis(100),
            frame_interval: Duration::from_millis(16),
            display_width: 1280,
            display_height: 720,
            card_offset: 400.0,
            mirror: true,
        }
    }
}

impl LiveConfig {
    /// Load configuration from `PERSONAR_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            camera_device: std::env::var("PERSONAR_CAMERA_DEVICE")
                .ok()
                .filter(|v| !v.is_empty()),
            model_dir: std::env::var("PERSONAR_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            known_faces_dir: std::env::var("PERSONAR_KNOWN_FACES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.known_faces_dir),
            profiles_path: std::env::var("PERSONAR_PROFILES_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            match_threshold: env_f32("PERSONAR_MATCH_THRESHOLD", defaults.match_threshold),
            detection_interval: Duration::from_millis(env_u64("PERSONAR_DETECTION_INTERVAL_MS", 100)),
            frame_interval: Duration::from_millis(env_u64("PERSONAR_FRAME_INTERVAL_MS", 16).max(1)),
            display_width: env_u32("PERSONAR_DISPLAY_WIDTH", defaults.display_width),
            display_height: env_u32("PERSONAR_DISPLAY_HEIGHT", defaults.display_height),
            card_offset: env_f32("PERSONAR_CARD_OFFSET_PX", defaults.card_offset),
            mirror: std::env::var("PERSONAR_MIRROR")
                .map(|v| v != "0")
                .unwrap_or(true),
        }
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir)
    }

    pub fn geometry(&self) -> OverlayGeometry {
        OverlayGeometry {
            display_width: self.display_width,
            display_height: self.display_height,
            mirror: self.mirror,
            card_offset: self.card_offset,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
