//! Persistence collaborator - currency and owned-vehicle data by player id

pub mod profiles;

pub use profiles::{MemoryProfileStore, ProfileStore, SavedProfile};
