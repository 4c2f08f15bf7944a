//! Player profile persistence
//!
//! The round core only touches persistence at round entry and exit: load a
//! profile when a participant joins, save it when they leave or the round
//! resets. The storage engine behind the trait is someone else's problem;
//! the core never learns the storage format.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::net::protocol::VehicleKind;

/// Persisted per-player data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedProfile {
    pub display_name: Option<String>,
    /// Authoritative currency carried between rounds
    pub currency: i64,
    /// Vehicles the player owns and may spawn with
    pub owned_vehicles: Vec<VehicleKind>,
}

impl Default for SavedProfile {
    fn default() -> Self {
        Self {
            display_name: None,
            currency: 0,
            owned_vehicles: vec![VehicleKind::Runner],
        }
    }
}

/// Key-value persistence seam used by the round core
pub trait ProfileStore: Send + Sync {
    /// Load a profile, `None` if the player has never been seen
    fn load(&self, participant_id: Uuid) -> Option<SavedProfile>;

    /// Save a profile, overwriting any previous value
    fn save(&self, participant_id: Uuid, profile: SavedProfile);
}

/// In-memory profile store used by the binary and tests
#[derive(Default)]
pub struct MemoryProfileStore {
    inner: RwLock<HashMap<Uuid, SavedProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn load(&self, participant_id: Uuid) -> Option<SavedProfile> {
        self.inner.read().get(&participant_id).cloned()
    }

    fn save(&self, participant_id: Uuid, profile: SavedProfile) {
        self.inner.write().insert(participant_id, profile);
    }
}
