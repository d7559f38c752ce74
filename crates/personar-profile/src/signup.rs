//! Multi-step onboarding: basics → scan → identity → profile.

use crate::form::{FieldErrors, SignupBasics};
use crate::profile::Profile;
use chrono::Utc;
use std::fmt;
use thiserror::Error;

/// Number of reference photo slots on the scan step.
pub const PHOTO_SLOTS: usize = 3;

pub const DEFAULT_STATUS: &str = "Exploring the AR frontier.";
pub const DEFAULT_LOCATION: &str = "Local Grid";
pub const LINK_BASE: &str = "https://personar.me/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Basics,
    Scan,
    Identity,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Basics => "basics",
            Step::Scan => "scan",
            Step::Identity => "identity",
        })
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum OnboardingError {
    #[error("invalid details: {0}")]
    Invalid(FieldErrors),
    #[error("capture at least one reference photo")]
    NoPhotos,
    #[error("photo slot {0} does not exist")]
    NoSuchSlot(usize),
    #[error("not an image data URL")]
    NotAnImage,
    #[error("expected step {expected}, currently at {actual}")]
    WrongStep { expected: Step, actual: Step },
}

/// State of one signup in progress.
#[derive(Debug, Clone)]
pub struct Onboarding {
    step: Step,
    pub basics: SignupBasics,
    pub status: String,
    pub bio: String,
    pub is_available: bool,
    photos: [Option<String>; PHOTO_SLOTS],
}

impl Default for Onboarding {
    fn default() -> Self {
        Self {
            step: Step::Basics,
            basics: SignupBasics::default(),
            status: DEFAULT_STATUS.to_string(),
            bio: String::new(),
            is_available: true,
            photos: Default::default(),
        }
    }
}

impl Onboarding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> Step {
        self.step
    }

    /// Advance one step, validating the current one.
    pub fn next(&mut self) -> Result<Step, OnboardingError> {
        self.step = match self.step {
            Step::Basics => {
                self.basics.validate().map_err(OnboardingError::Invalid)?;
                Step::Scan
            }
            Step::Scan => {
                if self.photo_count() == 0 {
                    return Err(OnboardingError::NoPhotos);
                }
                Step::Identity
            }
            Step::Identity => {
                return Err(OnboardingError::WrongStep {
                    expected: Step::Scan,
                    actual: Step::Identity,
                })
            }
        };
        tracing::debug!(step = %self.step, "onboarding advanced");
        Ok(self.step)
    }

    pub fn back(&mut self) -> Step {
        self.step = match self.step {
            Step::Basics | Step::Scan => Step::Basics,
            Step::Identity => Step::Scan,
        };
        self.step
    }

    /// Store a photo (a `data:image/...` URL) in `slot`, replacing any
    /// previous one.
    pub fn capture(&mut self, slot: usize, data_url: String) -> Result<(), OnboardingError> {
        if !data_url.starts_with("data:image/") {
            return Err(OnboardingError::NotAnImage);
        }
        let target = self.photos.get_mut(slot).ok_or(OnboardingError::NoSuchSlot(slot))?;
        *target = Some(data_url);
        Ok(())
    }

    pub fn remove_photo(&mut self, slot: usize) -> Result<Option<String>, OnboardingError> {
        let target = self.photos.get_mut(slot).ok_or(OnboardingError::NoSuchSlot(slot))?;
        Ok(target.take())
    }

    pub fn photo(&self, slot: usize) -> Option<&str> {
        self.photos.get(slot).and_then(|p| p.as_deref())
    }

    pub fn photo_count(&self) -> usize {
        self.photos.iter().flatten().count()
    }

    pub fn all_photos_captured(&self) -> bool {
        self.photo_count() == PHOTO_SLOTS
    }

    /// Build the profile. Returns the store label (the handle) with it.
    pub fn finalize(self) -> Result<(String, Profile), OnboardingError> {
        if self.step != Step::Identity {
            return Err(OnboardingError::WrongStep {
                expected: Step::Identity,
                actual: self.step,
            });
        }
        let captured_images: Vec<String> = self.photos.into_iter().flatten().collect();
        let avatar_url = captured_images.first().cloned().ok_or(OnboardingError::NoPhotos)?;

        let now = Utc::now();
        let handle = self.basics.handle;
        let profile = Profile {
            full_name: self.basics.full_name,
            email: self.basics.email,
            link: format!("{LINK_BASE}{handle}"),
            handle: handle.clone(),
            status: self.status,
            bio: self.bio,
            location: DEFAULT_LOCATION.to_string(),
            is_verified: true,
            is_available: self.is_available,
            avatar_url,
            captured_images,
            created_at: now,
            updated_at: now,
        };
        tracing::info!(handle = %profile.handle, photos = profile.captured_images.len(), "onboarding complete");
        Ok((handle, profile))
    }
}
