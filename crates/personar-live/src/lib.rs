//! personar-live — recognition in a running camera feed.
//!
//! The engine thread owns the networks, the capture thread keeps the newest
//! camera frame, the registry session keeps a matcher
//! in step with the profile store, and the detection loop turns frames into
//! positioned identity cards.

pub mod config;
pub mod engine;
pub mod feed;
pub mod live;
pub mod overlay;
pub mod session;
pub mod throttle;

pub use config::{LiveConfig, DEFAULT_MATCH_THRESHOLD};
pub use engine::{spawn_engine, EngineError, EngineHandle};
pub use feed::CameraFeed;
pub use live::{DetectionLoop, FrameSource, LiveError, LoopState, Overlays};
pub use overlay::{card_scale, place, place_all, OverlayGeometry, OverlayPlacement};
pub use session::{profile_identities, MatcherRx, RegistrySession};
pub use throttle::Throttle;
