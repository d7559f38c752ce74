//! Keeps the matcher in step with the profile store.
//!
//! Each published profile snapshot triggers a registry rebuild on the engine
//! thread; the resulting matcher replaces the previous one wholesale.

use crate::engine::{EngineError, EngineHandle};
use crate::live::LiveError;
use personar_core::{reference_images, FaceMatcher, IdentitySources};
use personar_profile::ProfileSnapshot;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Latest matcher, `None` while no identity can be matched.
pub type MatcherRx = watch::Receiver<Option<Arc<FaceMatcher>>>;

/// Reference images for every stored profile, keyed by store label.
pub fn profile_identities(snapshot: &ProfileSnapshot, known_faces_dir: &Path) -> Vec<IdentitySources> {
    snapshot
        .profiles
        .iter()
        .map(|(label, profile)| IdentitySources {
            label: label.clone(),
            images: reference_images(known_faces_dir, label, &profile.captured_images),
        })
        .collect()
}

pub struct RegistrySession {
    engine: EngineHandle,
    known_faces_dir: PathBuf,
    threshold: f32,
}

impl RegistrySession {
    pub fn new(engine: EngineHandle, known_faces_dir: PathBuf, threshold: f32) -> Self {
        Self {
            engine,
            known_faces_dir,
            threshold,
        }
    }

    pub fn identities(&self, snapshot: &ProfileSnapshot) -> Vec<IdentitySources> {
        profile_identities(snapshot, &self.known_faces_dir)
    }

    pub async fn build_matcher(&self, snapshot: &ProfileSnapshot) -> Result<FaceMatcher, LiveError> {
        let registry = self.engine.build_registry(self.identities(snapshot)).await?;
        let matcher = FaceMatcher::new(registry, self.threshold)?;
        tracing::info!(
            version = snapshot.version,
            identities = matcher.registry().entries().len(),
            "matcher ready"
        );
        Ok(matcher)
    }

    /// Build a matcher now and again after every profile change.
    ///
    /// The task ends when the profile store or every matcher receiver is
    /// dropped, or the engine thread goes away.
    pub fn spawn(self, mut profiles: watch::Receiver<Arc<ProfileSnapshot>>) -> (MatcherRx, JoinHandle<()>) {
        let (tx, rx) = watch::channel(None);

        let task = tokio::spawn(async move {
            loop {
                let snapshot = profiles.borrow_and_update().clone();
                match self.build_matcher(&snapshot).await {
                    Ok(matcher) => {
                        tx.send_replace(Some(Arc::new(matcher)));
                    }
                    Err(LiveError::Engine(EngineError::ChannelClosed)) => {
                        tracing::error!("engine thread gone, stopping registry session");
                        tx.send_replace(None);
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, version = snapshot.version, "matcher unavailable");
                        tx.send_replace(None);
                    }
                }

                tokio::select! {
                    changed = profiles.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        tracing::info!("profiles changed, rebuilding registry");
                    }
                    _ = tx.closed() => break,
                }
            }
            tracing::debug!("registry session ended");
        });

        (rx, task)
    }
}
