//! In-process profile store keyed by recognition label.
//!
//! Readers take an immutable [`ProfileSnapshot`]; every mutation publishes a
//! fresh snapshot with a bumped version through a `watch` channel, so the
//! live session can rebuild its registry when identities change.

use crate::profile::{seed_profiles, Profile, ProfilePatch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no profile for label {0}")]
    NotFound(String),
    #[error("label must not be empty")]
    EmptyLabel,
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid profiles file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize profiles: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Point-in-time view of every stored profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSnapshot {
    pub version: u64,
    pub profiles: BTreeMap<String, Profile>,
}

impl ProfileSnapshot {
    pub fn get(&self, label: &str) -> Option<&Profile> {
        self.profiles.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// On-disk layout: one `[profiles.<label>]` table per identity.
#[derive(Serialize, Deserialize)]
struct ProfilesFile {
    #[serde(default)]
    profiles: BTreeMap<String, Profile>,
}

pub struct ProfileStore {
    tx: watch::Sender<Arc<ProfileSnapshot>>,
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::seeded()
    }
}

impl ProfileStore {
    /// A store holding exactly `profiles`.
    pub fn new(profiles: impl IntoIterator<Item = (String, Profile)>) -> Self {
        let snapshot = ProfileSnapshot {
            version: 0,
            profiles: profiles.into_iter().collect(),
        };
        let (tx, _rx) = watch::channel(Arc::new(snapshot));
        Self { tx }
    }

    /// A store pre-populated with the demo identities.
    pub fn seeded() -> Self {
        Self::new(seed_profiles())
    }

    /// Load from a TOML file, or start seeded when the file does not exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no profiles file, using seed profiles");
            return Ok(Self::seeded());
        }
        Self::load(path)
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ProfilesFile = toml::from_str(&text)?;
        tracing::info!(path = %path.display(), count = file.profiles.len(), "loaded profiles");
        Ok(Self::new(file.profiles))
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let file = ProfilesFile {
            profiles: self.snapshot().profiles.clone(),
        };
        let text = toml::to_string_pretty(&file)?;
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, text).map_err(io_err)?;
        tracing::info!(path = %path.display(), count = file.profiles.len(), "saved profiles");
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<ProfileSnapshot> {
        self.tx.borrow().clone()
    }

    /// Receive every snapshot published after this call.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ProfileSnapshot>> {
        self.tx.subscribe()
    }

    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    pub fn get(&self, label: &str) -> Option<Profile> {
        self.tx.borrow().get(label).cloned()
    }

    pub fn labels(&self) -> Vec<String> {
        self.tx.borrow().profiles.keys().cloned().collect()
    }

    /// Insert `profile` under `label`, replacing any existing entry.
    pub fn add(&self, label: &str, profile: Profile) -> Result<Option<Profile>, StoreError> {
        if label.trim().is_empty() {
            return Err(StoreError::EmptyLabel);
        }
        let mut previous = None;
        self.publish(|profiles| {
            previous = profiles.insert(label.to_string(), profile);
            true
        });
        tracing::info!(label, replaced = previous.is_some(), "profile added");
        Ok(previous)
    }

    /// Merge `patch` into the profile stored under `label`.
    pub fn update(&self, label: &str, patch: ProfilePatch) -> Result<Profile, StoreError> {
        let mut updated = None;
        self.publish(|profiles| match profiles.get_mut(label) {
            Some(profile) => {
                let before = profile.clone();
                profile.merge(patch);
                updated = Some(profile.clone());
                *profile != before
            }
            None => false,
        });
        let profile = updated.ok_or_else(|| StoreError::NotFound(label.to_string()))?;
        tracing::info!(label, "profile updated");
        Ok(profile)
    }

    pub fn remove(&self, label: &str) -> Option<Profile> {
        let mut removed = None;
        self.publish(|profiles| {
            removed = profiles.remove(label);
            removed.is_some()
        });
        if removed.is_some() {
            tracing::info!(label, "profile removed");
        }
        removed
    }

    /// Copy-on-write mutation. A new snapshot is published only when `f`
    /// reports a change.
    fn publish(&self, f: impl FnOnce(&mut BTreeMap<String, Profile>) -> bool) {
        self.tx.send_if_modified(|current| {
            let mut profiles = current.profiles.clone();
            if !f(&mut profiles) {
                return false;
            }
            *current = Arc::new(ProfileSnapshot {
                version: current.version + 1,
                profiles,
            });
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::sample;

    #[test]
    fn test_seeded_store() {
        let store = ProfileStore::seeded();
        assert_eq!(store.labels(), vec!["Jun", "Khoi", "Owen"]);
        assert_eq!(store.get("Khoi").unwrap().full_name, "Khoi Nguyen");
        assert!(store.get("khoi").is_none());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_add_replaces_and_bumps_version() {
        let store = ProfileStore::new([]);
        assert!(store.add("alex", sample("alex")).unwrap().is_none());
        assert_eq!(store.version(), 1);

        let mut second = sample("alex");
        second.status = "hi".into();
        let previous = store.add("alex", second).unwrap();
        assert!(previous.is_some());
        assert_eq!(store.get("alex").unwrap().status, "hi");
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn test_add_empty_label_rejected() {
        let store = ProfileStore::new([]);
        assert!(matches!(store.add("  ", sample("x")), Err(StoreError::EmptyLabel)));
    }

    #[test]
    fn test_update_merges() {
        let store = ProfileStore::seeded();
        let updated = store
            .update(
                "Jun",
                ProfilePatch {
                    bio: Some("short".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.bio, "short");
        assert_eq!(updated.full_name, "Jun Kim");
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_update_missing_label() {
        let store = ProfileStore::seeded();
        let err = store.update("Nobody", ProfilePatch::default()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(l) if l == "Nobody"));
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_noop_update_keeps_version() {
        let store = ProfileStore::seeded();
        store.update("Jun", ProfilePatch::default()).unwrap();
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_remove() {
        let store = ProfileStore::seeded();
        assert!(store.remove("Owen").is_some());
        assert!(store.remove("Owen").is_none());
        assert_eq!(store.labels(), vec!["Jun", "Khoi"]);
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_snapshot_is_immutable() {
        let store = ProfileStore::seeded();
        let before = store.snapshot();
        store.remove("Jun");
        assert!(before.get("Jun").is_some());
        assert!(store.snapshot().get("Jun").is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let store = ProfileStore::seeded();
        let mut rx = store.subscribe();
        store.add("alex", sample("alex")).unwrap();
        rx.changed().await.unwrap();
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.version, 1);
        assert!(snap.get("alex").is_some());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/profiles.toml");

        let store = ProfileStore::seeded();
        let mut p = sample("alex");
        p.captured_images = vec!["data:image/png;base64,AAAA".into()];
        store.add("alex", p).unwrap();
        store.save(&path).unwrap();

        let loaded = ProfileStore::load(&path).unwrap();
        assert_eq!(loaded.labels(), vec!["Jun", "Khoi", "Owen", "alex"]);
        assert_eq!(loaded.snapshot().profiles, store.snapshot().profiles);
    }

    #[test]
    fn test_open_missing_file_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(store.labels().len(), 3);
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "profiles = [not toml").unwrap();
        assert!(matches!(ProfileStore::load(&path), Err(StoreError::Parse(_))));
    }
}
