//! The live detection loop.
//!
//! Ticks at display rate, admits one recognition per detection interval,
//! and publishes the resulting card set, replacing the previous one.

use crate::config::LiveConfig;
use crate::engine::{EngineError, EngineHandle};
use crate::overlay::{place_all, OverlayGeometry, OverlayPlacement};
use crate::session::MatcherRx;
use crate::throttle::Throttle;
use image::GrayImage;
use personar_core::{FaceMatcher, MatcherError, ModelError};
use personar_hw::{CameraError, FrameError};
use personar_profile::{ProfileSnapshot, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("matcher error: {0}")]
    Matcher(#[from] MatcherError),
    #[error("model error: {0}")]
    Models(#[from] ModelError),
    #[error("profile store error: {0}")]
    Store(#[from] StoreError),
    #[error("no frame captured yet")]
    NoFrame,
    #[error("failed to spawn capture thread: {0}")]
    Thread(std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for a playing source and a matcher.
    Idle,
    Running,
}

/// Where frames come from.
pub trait FrameSource {
    /// Whether frames are currently flowing.
    fn is_playing(&self) -> bool;

    /// Grab the current frame at native resolution.
    fn capture(&mut self) -> Result<GrayImage, LiveError>;
}

/// Published card set.
pub type Overlays = Arc<Vec<OverlayPlacement>>;

pub struct DetectionLoop {
    engine: EngineHandle,
    matcher: MatcherRx,
    profiles: watch::Receiver<Arc<ProfileSnapshot>>,
    geometry: OverlayGeometry,
    threshold: f32,
    frame_interval: Duration,
    throttle: Throttle,
    state: watch::Sender<LoopState>,
    overlays: watch::Sender<Overlays>,
}

impl DetectionLoop {
    pub fn new(
        config: &LiveConfig,
        engine: EngineHandle,
        matcher: MatcherRx,
        profiles: watch::Receiver<Arc<ProfileSnapshot>>,
    ) -> Self {
        let (state, _) = watch::channel(LoopState::Idle);
        let (overlays, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            engine,
            matcher,
            profiles,
            geometry: config.geometry(),
            threshold: config.match_threshold,
            frame_interval: config.frame_interval,
            throttle: Throttle::new(config.detection_interval),
            state,
            overlays,
        }
    }

    /// Cards of the latest completed recognition.
    pub fn overlays(&self) -> watch::Receiver<Overlays> {
        self.overlays.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Run until `alive` returns false. `alive` is checked on every tick.
    ///
    /// Per-frame failures are logged and leave the current cards in place;
    /// only a dead engine thread ends the loop with an error.
    pub async fn run<S, F>(&mut self, source: &mut S, mut alive: F) -> Result<(), LiveError>
    where
        S: FrameSource + ?Sized,
        F: FnMut() -> bool,
    {
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if !alive() {
                break;
            }

            let matcher = self.matcher.borrow().clone();
            let matcher = match matcher {
                Some(m) if source.is_playing() => m,
                _ => {
                    self.enter(LoopState::Idle);
                    continue;
                }
            };
            self.enter(LoopState::Running);

            if !self.throttle.ready(Instant::now()) {
                continue;
            }

            match self.detect_once(source, matcher).await {
                Ok(cards) => {
                    tracing::debug!(cards = cards.len(), "overlays updated");
                    self.overlays.send_replace(Arc::new(cards));
                }
                Err(LiveError::Engine(EngineError::ChannelClosed)) => {
                    self.enter(LoopState::Idle);
                    return Err(EngineError::ChannelClosed.into());
                }
                Err(e) => tracing::warn!(error = %e, "detection pass failed, keeping previous overlays"),
            }
        }

        self.enter(LoopState::Idle);
        Ok(())
    }

    async fn detect_once<S>(
        &self,
        source: &mut S,
        matcher: Arc<FaceMatcher>,
    ) -> Result<Vec<OverlayPlacement>, LiveError>
    where
        S: FrameSource + ?Sized,
    {
        let image = source.capture()?;
        let native = image.dimensions();
        let faces = self.engine.recognize(image, matcher).await?;
        let profiles = self.profiles.borrow().clone();
        Ok(place_all(&faces, native, &self.geometry, self.threshold, &profiles))
    }

    fn enter(&mut self, next: LoopState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if !changed {
            return;
        }
        tracing::info!(state = ?next, "detection loop state changed");
        if next == LoopState::Idle {
            self.throttle.reset();
            self.overlays.send_replace(Arc::new(Vec::new()));
        }
    }
}
