//! Persisted data models
//!
//! - UserProfile: biometrics and the derived daily goal
//! - HydrationEntry: one committed intake, immutable once written

pub mod hydration_entry;
pub mod profile;

pub use hydration_entry::{total_amount_ml, HydrationEntry};
pub use profile::UserProfile;
