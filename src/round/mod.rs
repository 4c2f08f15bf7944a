//! Authoritative round simulation
//!
//! The round core is a single-writer simulation: action requests queue on a
//! channel and are drained once per tick by the [`state::GameRound`] task.
//! Everything mutable lives in [`RoundWorld`] and is only touched from that
//! task, which is what makes per-tick contention rules enforceable.

pub mod combat;
pub mod economy;
pub mod ownership;
pub mod packages;
pub mod spawn;
pub mod state;
pub mod vehicles;

pub use state::{GameRound, RoundHandle, RoundPhase, RoundState};

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::RequestError;
use crate::net::protocol::{ClientAction, Vec2, VehicleKind};
use packages::PackageRegistry;
use vehicles::VehicleArena;

/// An inbound action request queued for the next tick
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub participant_id: Uuid,
    pub action: ClientAction,
    /// Unix-millis arrival stamp from the transport, for queue-age logging
    pub received_at: u64,
}

/// Out-of-band control messages for the round task
#[derive(Debug, Clone, Copy)]
pub enum ControlMsg {
    /// Force the round out of `Active` early, discarding queued requests
    EndRound,
    /// Stop the round task entirely
    Shutdown,
}

/// Authoritative per-round participant record
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: Uuid,
    pub display_name: String,
    pub vehicle_kind: VehicleKind,
    /// Current vehicle, `None` while dead
    pub vehicle: Option<Uuid>,
    pub alive: bool,
    /// Package currently carried (carrier→package is 1:1)
    pub carrying: Option<Uuid>,
    /// Seconds until respawn while dead
    pub respawn_timer: f32,
    /// Position of the vehicle when it was last removed
    pub last_position: Vec2,

    // Per-round stats, settled at scoring
    pub kills: u32,
    pub deliveries: u32,
    pub damage_dealt: f32,
    pub damage_taken: f32,
}

impl Participant {
    pub fn new(id: Uuid, display_name: String, vehicle_kind: VehicleKind) -> Self {
        Self {
            id,
            display_name,
            vehicle_kind,
            vehicle: None,
            alive: false,
            carrying: None,
            respawn_timer: 0.0,
            last_position: Vec2::default(),
            kills: 0,
            deliveries: 0,
            damage_dealt: 0.0,
            damage_taken: 0.0,
        }
    }
}

/// The mutable shared state of one round. Components never reach into each
/// other's fields; mutation goes through the operations on the registries.
#[derive(Debug, Default)]
pub struct RoundWorld {
    pub participants: HashMap<Uuid, Participant>,
    pub packages: PackageRegistry,
    pub vehicles: VehicleArena,
    /// Fixed once spawn results are committed, cleared at round reset
    pub destination: Option<Vec2>,
}

impl RoundWorld {
    pub fn participant(&self, id: Uuid) -> Result<&Participant, RequestError> {
        self.participants.get(&id).ok_or(RequestError::NotFound)
    }

    pub fn participant_mut(&mut self, id: Uuid) -> Result<&mut Participant, RequestError> {
        self.participants.get_mut(&id).ok_or(RequestError::NotFound)
    }

    /// Current world position of a participant's vehicle
    pub fn position_of(&self, id: Uuid) -> Option<Vec2> {
        self.participants
            .get(&id)
            .and_then(|p| p.vehicle)
            .and_then(|v| self.vehicles.position(v))
    }

    /// Remove a participant's vehicle, recording its last position
    pub fn retire_vehicle(&mut self, id: Uuid) {
        let Some(participant) = self.participants.get_mut(&id) else {
            return;
        };
        if let Some(vehicle) = participant.vehicle.take() {
            if let Some(position) = self.vehicles.remove(vehicle) {
                participant.last_position = position;
            }
        }
    }
}
