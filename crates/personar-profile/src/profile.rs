//! The identity shown on an AR card.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A person who can be recognised and shown on a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub full_name: String,
    pub handle: String,
    pub email: String,
    /// One-line status quote shown on the card.
    pub status: String,
    pub bio: String,
    pub location: String,
    pub is_verified: bool,
    pub is_available: bool,
    pub link: String,
    pub avatar_url: String,
    /// Onboarding photos as `data:` URLs. Used as recognition references
    /// in place of the on-disk known-faces images.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub captured_images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update merged into an existing profile. `None` keeps the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub full_name: Option<String>,
    pub handle: Option<String>,
    pub email: Option<String>,
    pub status: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub is_verified: Option<bool>,
    pub is_available: Option<bool>,
    pub link: Option<String>,
    pub avatar_url: Option<String>,
    pub captured_images: Option<Vec<String>>,
}

impl Profile {
    /// Apply `patch`, bumping `updated_at` when anything changed.
    pub fn merge(&mut self, patch: ProfilePatch) {
        let before = self.clone();

        macro_rules! take {
            ($($field:ident),*) => {
                $(if let Some(v) = patch.$field { self.$field = v; })*
            };
        }
        take!(
            full_name,
            handle,
            email,
            status,
            bio,
            location,
            is_verified,
            is_available,
            link,
            avatar_url,
            captured_images
        );

        if *self != before {
            self.updated_at = Utc::now();
        }
    }

    /// Card availability badge.
    pub fn presence(&self) -> &'static str {
        if self.is_available {
            "Online"
        } else {
            "Quiet"
        }
    }
}

struct Seed {
    label: &'static str,
    full_name: &'static str,
    handle: &'static str,
    status: &'static str,
    bio: &'static str,
    location: &'static str,
    avatar_url: &'static str,
    link: &'static str,
}

const SEEDS: &[Seed] = &[
    Seed {
        label: "Jun",
        full_name: "Jun Kim",
        handle: "jun_dev",
        status: "Building the future of human-computer interaction through AR interfaces.",
        bio: "Full-stack developer and AR enthusiast. Passionate about creating seamless digital experiences that blend the physical and virtual worlds.",
        location: "Seoul, KR",
        avatar_url: "https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d?w=400&h=400&fit=crop",
        link: "https://jun.dev",
    },
    Seed {
        label: "Khoi",
        full_name: "Khoi Nguyen",
        handle: "khoi_design",
        status: "Crafting beautiful user experiences at the intersection of design and technology.",
        bio: "UX Designer specializing in AR/VR interfaces. Believes in technology that feels natural and enhances human connection.",
        location: "Ho Chi Minh City, VN",
        avatar_url: "https://images.unsplash.com/photo-1472099645785-5658abf4ff4e?w=400&h=400&fit=crop",
        link: "https://khoi.design",
    },
    Seed {
        label: "Owen",
        full_name: "Owen Chen",
        handle: "owen_research",
        status: "Researching the ethical implications of augmented reality in social spaces.",
        bio: "Computer Vision Researcher & AI Ethics Advocate. Working on responsible AR technology that respects privacy and human dignity.",
        location: "San Francisco, CA",
        avatar_url: "https://images.unsplash.com/photo-1519244703995-f4e0f30006d5?w=400&h=400&fit=crop",
        link: "https://owen.ai",
    },
];

/// The demo identities every fresh store starts with, keyed by the label
/// their known-faces directory uses.
pub fn seed_profiles() -> Vec<(String, Profile)> {
    let now = Utc::now();
    SEEDS
        .iter()
        .map(|s| {
            let profile = Profile {
                full_name: s.full_name.into(),
                handle: s.handle.into(),
                email: format!("{}@personar.me", s.label.to_lowercase()),
                status: s.status.into(),
                bio: s.bio.into(),
                location: s.location.into(),
                is_verified: true,
                is_available: true,
                link: s.link.into(),
                avatar_url: s.avatar_url.into(),
                captured_images: Vec::new(),
                created_at: now,
                updated_at: now,
            };
            (s.label.to_string(), profile)
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn sample(handle: &str) -> Profile {
    let now = Utc::now();
    Profile {
        full_name: "Sample Person".into(),
        handle: handle.into(),
        email: format!("{handle}@example.com"),
        status: String::new(),
        bio: String::new(),
        location: String::new(),
        is_verified: false,
        is_available: true,
        link: String::new(),
        avatar_url: String::new(),
        captured_images: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}
