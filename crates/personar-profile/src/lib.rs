//! personar-profile — identities behind the AR cards.
//!
//! Holds the profile store the live view resolves labels against, the
//! onboarding flow that creates new identities, form validation and the
//! generative bio client.

pub mod bio;
pub mod form;
pub mod profile;
pub mod signup;
pub mod store;

pub use bio::{BioClient, BioError, GeneratedBio};
pub use form::{FieldErrors, LoginForm, SignupBasics};
pub use profile::{seed_profiles, Profile, ProfilePatch};
pub use signup::{Onboarding, OnboardingError, Step};
pub use store::{ProfileSnapshot, ProfileStore, StoreError};
