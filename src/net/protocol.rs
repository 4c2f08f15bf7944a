//! Replication message definitions
//!
//! These are the types crossing the network seam: action requests keyed by
//! participant id coming in, simulation events going out. Transport framing
//! and delivery live in the excluded networking layer; it is assumed to be
//! reliable and ordered per player.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::round::economy::LedgerReason;
use crate::round::packages::PackageStatus;
use crate::round::state::RoundPhase;

/// 2D world position/velocity
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Vehicle chassis available in the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleKind {
    /// Fast but fragile
    Runner,
    /// Balanced stats
    Hauler,
    /// Quick with strong forward guns
    Interceptor,
    /// Heavy, slow, punishing in collisions
    Juggernaut,
}

impl Default for VehicleKind {
    fn default() -> Self {
        Self::Hauler
    }
}

/// Weapon types mountable on vehicles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    /// Low fixed damage, long range
    MachineGun,
    /// High range-sampled damage, short range
    Cannon,
    /// Mid-range lobbed shell
    Mortar,
}

/// Action requests sent from clients to the round core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAction {
    /// Enter the round during the lobby phase
    Join {
        display_name: String,
        vehicle_kind: VehicleKind,
    },

    /// Leave the round (also issued on disconnect)
    Leave,

    /// Pick up a spawned package within reach
    Pickup { package_id: Uuid },

    /// Steal the package a nearby participant is carrying
    Steal { target_id: Uuid },

    /// Drop the carried package at the current position
    Drop,

    /// Deliver the carried package at the destination
    Deliver,

    /// Fire a mounted weapon at a target
    Fire {
        /// Unique id for duplicate-delivery discard
        event_id: Uuid,
        target_id: Uuid,
        /// Weapon mount slot index
        slot: usize,
    },

    /// Shop purchase (funds validation only, catalog is external)
    Purchase { item_id: Uuid, price: i64 },
}

/// Participant info for join notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub participant_id: Uuid,
    pub display_name: String,
    pub vehicle_kind: VehicleKind,
}

/// Events emitted by the simulation, drained once per tick
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Round moved to a new phase
    RoundPhaseChanged { phase: RoundPhase, tick: u64 },

    /// Spawn results committed at the start of a round
    SpawnCommitted {
        round_id: Uuid,
        package_positions: Vec<(Uuid, Vec2)>,
        destination: Vec2,
    },

    /// Participant entered the round
    ParticipantJoined { participant: ParticipantInfo },

    /// Participant left the round
    ParticipantLeft { participant_id: Uuid, reason: String },

    /// Package ownership or status changed
    PackageStatusChanged {
        package_id: Uuid,
        status: PackageStatus,
        carrier_id: Option<Uuid>,
        position: Option<Vec2>,
    },

    /// Damage was applied to a participant's vehicle
    DamageApplied {
        event_id: Uuid,
        target_id: Uuid,
        amount: f32,
        attacker_id: Option<Uuid>,
        /// "weapon" or "collision"
        cause: String,
    },

    /// Participant died
    Death {
        participant_id: Uuid,
        killer_id: Option<Uuid>,
    },

    /// Participant respawned with a fresh vehicle
    Respawn {
        participant_id: Uuid,
        position: Vec2,
    },

    /// Package delivered at the destination
    Delivery {
        participant_id: Uuid,
        package_id: Uuid,
        reward: i64,
    },

    /// Ledger balance changed
    BalanceChanged {
        participant_id: Uuid,
        balance: i64,
        reason: LedgerReason,
    },

    /// Request rejected; no state was changed
    Rejected {
        participant_id: Uuid,
        code: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_actions_use_snake_case_type_tags() {
        let json = serde_json::json!({
            "type": "pickup",
            "package_id": Uuid::new_v4(),
        });
        let action: ClientAction = serde_json::from_value(json).unwrap();
        assert!(matches!(action, ClientAction::Pickup { .. }));

        let json = serde_json::json!({
            "type": "join",
            "display_name": "driver",
            "vehicle_kind": "juggernaut",
        });
        let action: ClientAction = serde_json::from_value(json).unwrap();
        assert!(matches!(
            action,
            ClientAction::Join {
                vehicle_kind: VehicleKind::Juggernaut,
                ..
            }
        ));
    }

    #[test]
    fn server_events_carry_the_event_type_tag() {
        let event = ServerEvent::Delivery {
            participant_id: Uuid::new_v4(),
            package_id: Uuid::new_v4(),
            reward: 130,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "delivery");
        assert_eq!(value["reward"], 130);
    }

    #[test]
    fn unknown_action_type_fails_to_parse() {
        let json = r#"{"type":"teleport","x":0,"y":0}"#;
        assert!(serde_json::from_str::<ClientAction>(json).is_err());
    }
}
