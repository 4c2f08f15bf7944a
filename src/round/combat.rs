//! Damage model - weapon fire and collision damage
//!
//! Weapon damage is fixed or range-sampled from the weapon descriptor.
//! Collision damage splits by momentum: each vehicle takes damage
//! proportional to the *other* vehicle's momentum contribution, so a heavy
//! rig ramming a runner hurts the runner far more than itself. Every event
//! carries a unique id; duplicates inside a sliding tick window are silently
//! discarded so redelivered events never double-apply.

use std::collections::HashMap;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::error::RequestError;
use crate::net::protocol::WeaponKind;
use crate::round::vehicles::VehicleStats;
use crate::round::RoundWorld;

/// Ballistic constants per weapon kind
#[derive(Debug, Clone, Copy)]
pub struct WeaponDescriptor {
    /// Lower damage bound; equal to `damage_max` for fixed-damage weapons
    pub damage_min: f32,
    pub damage_max: f32,
    /// Maximum engagement distance
    pub range: f32,
}

impl WeaponDescriptor {
    pub fn for_kind(kind: WeaponKind) -> Self {
        match kind {
            WeaponKind::MachineGun => Self {
                damage_min: 6.0,
                damage_max: 6.0,
                range: 420.0,
            },
            WeaponKind::Cannon => Self {
                damage_min: 18.0,
                damage_max: 30.0,
                range: 260.0,
            },
            WeaponKind::Mortar => Self {
                damage_min: 10.0,
                damage_max: 22.0,
                range: 340.0,
            },
        }
    }
}

/// A weapon-fire event from a participant
#[derive(Debug, Clone, Copy)]
pub struct FireEvent {
    pub event_id: Uuid,
    pub attacker: Uuid,
    pub target: Uuid,
    /// Mount slot on the attacker's vehicle
    pub slot: usize,
}

/// A vehicle-pair collision event from the physics step
#[derive(Debug, Clone, Copy)]
pub struct CollisionEvent {
    pub event_id: Uuid,
    pub vehicle_a: Uuid,
    pub vehicle_b: Uuid,
    pub relative_speed: f32,
}

/// One applied damage result
#[derive(Debug, Clone, Copy)]
pub struct DamageOutcome {
    pub event_id: Uuid,
    pub target: Uuid,
    pub attacker: Option<Uuid>,
    pub amount: f32,
    pub killed: bool,
    /// "weapon" or "collision"
    pub cause: &'static str,
}

/// Computes and applies combat and collision damage
#[derive(Debug)]
pub struct DamageModel {
    /// Recently seen event ids and the tick they arrived on
    dedup: HashMap<Uuid, u64>,
    window_ticks: u64,
    collision_factor: f32,
    min_impact_speed: f32,
}

impl DamageModel {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            dedup: HashMap::new(),
            window_ticks: config.dedup_window_ticks,
            collision_factor: config.collision_factor,
            min_impact_speed: config.min_impact_speed,
        }
    }

    /// Forget event ids older than the dedup window. Called once per tick.
    pub fn prune(&mut self, tick: u64) {
        let window = self.window_ticks;
        self.dedup.retain(|_, seen| tick.saturating_sub(*seen) < window);
    }

    /// Record an event id; false if it was already seen inside the window
    fn register(&mut self, event_id: Uuid, tick: u64) -> bool {
        use std::collections::hash_map::Entry;
        match self.dedup.entry(event_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(tick);
                true
            }
        }
    }

    /// Damage this vehicle takes from the other vehicle's momentum share
    fn collision_damage(&self, other_mass: f32, relative_speed: f32) -> f32 {
        self.collision_factor * (other_mass / 1000.0) * relative_speed
    }

    /// Apply a weapon-fire event. Duplicates are silently discarded
    /// (empty outcome, not an error).
    pub fn apply_fire(
        &mut self,
        world: &mut RoundWorld,
        rng: &mut ChaCha8Rng,
        event: FireEvent,
        tick: u64,
    ) -> Result<Vec<DamageOutcome>, RequestError> {
        if !self.register(event.event_id, tick) {
            return Ok(Vec::new());
        }

        let attacker = world.participant(event.attacker)?;
        let attacker_vehicle = attacker.vehicle.ok_or(RequestError::NotEligible)?;
        if !attacker.alive {
            return Err(RequestError::NotEligible);
        }
        let target = world.participant(event.target)?;
        let target_vehicle = target.vehicle.ok_or(RequestError::NotEligible)?;
        if !target.alive || event.attacker == event.target {
            return Err(RequestError::NotEligible);
        }

        let kind = world
            .vehicles
            .kind(attacker_vehicle)
            .ok_or(RequestError::NotFound)?;
        let mounts = VehicleStats::for_kind(kind).mounts;
        let weapon = mounts
            .get(event.slot)
            .copied()
            .ok_or(RequestError::NotEligible)?;
        let descriptor = WeaponDescriptor::for_kind(weapon);

        let attacker_pos = world
            .vehicles
            .position(attacker_vehicle)
            .ok_or(RequestError::NotFound)?;
        let target_pos = world
            .vehicles
            .position(target_vehicle)
            .ok_or(RequestError::NotFound)?;
        if attacker_pos.distance(target_pos) > descriptor.range {
            return Err(RequestError::NotEligible);
        }

        let amount = if descriptor.damage_min >= descriptor.damage_max {
            descriptor.damage_max
        } else {
            rng.gen_range(descriptor.damage_min..=descriptor.damage_max)
        };

        let (_, killed) = world
            .vehicles
            .apply_damage(target_vehicle, amount)
            .ok_or(RequestError::NotFound)?;

        Ok(vec![DamageOutcome {
            event_id: event.event_id,
            target: event.target,
            attacker: Some(event.attacker),
            amount,
            killed,
            cause: "weapon",
        }])
    }

    /// Apply a collision event to both vehicles. Impacts slower than the
    /// damage threshold and duplicate events apply nothing.
    pub fn apply_collision(
        &mut self,
        world: &mut RoundWorld,
        event: CollisionEvent,
        tick: u64,
    ) -> Vec<DamageOutcome> {
        if event.relative_speed < self.min_impact_speed {
            return Vec::new();
        }
        if !self.register(event.event_id, tick) {
            return Vec::new();
        }

        let pair = [
            (event.vehicle_a, event.vehicle_b),
            (event.vehicle_b, event.vehicle_a),
        ];

        let mut outcomes = Vec::with_capacity(2);
        for (vehicle, other) in pair {
            let Some(other_kind) = world.vehicles.kind(other) else {
                continue;
            };
            let other_mass = VehicleStats::for_kind(other_kind).mass;
            let amount = self.collision_damage(other_mass, event.relative_speed);

            let Some((_, killed)) = world.vehicles.apply_damage(vehicle, amount) else {
                continue;
            };
            let Some(target) = world.vehicles.owner(vehicle) else {
                continue;
            };
            outcomes.push(DamageOutcome {
                event_id: event.event_id,
                target,
                attacker: world.vehicles.owner(other),
                amount,
                killed,
                cause: "collision",
            });
        }
        outcomes
    }
}
