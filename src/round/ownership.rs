//! Ownership resolution - pickup, steal, drop and deliver arbitration
//!
//! All four operations may be requested by many participants in the same
//! tick. The resolver guarantees at most one accepted mutating outcome per
//! package per tick: the first request to mutate a package id wins, every
//! later mutating request against that id fails `AlreadyTaken`. The winner
//! set is keyed by package id, so unrelated packages never block each other.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::config::GameConfig;
use crate::error::RequestError;
use crate::net::protocol::Vec2;
use crate::round::packages::PackageStatus;
use crate::round::RoundWorld;

/// An accepted ownership mutation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OwnershipChange {
    PickedUp {
        package_id: Uuid,
        carrier: Uuid,
    },
    Stolen {
        package_id: Uuid,
        from: Uuid,
        to: Uuid,
    },
    Dropped {
        package_id: Uuid,
        carrier: Uuid,
        position: Vec2,
    },
    Delivered {
        package_id: Uuid,
        carrier: Uuid,
        /// Distance from the package's spawn point to the destination,
        /// feeds the distance-weighted reward
        haul_distance: f32,
    },
}

/// Arbitrates concurrent ownership requests against the package registry
#[derive(Debug)]
pub struct OwnershipResolver {
    pickup_radius: f32,
    steal_range: f32,
    deliver_radius: f32,
    /// Packages already mutated this tick (the per-package winner set)
    tick_mutated: HashSet<Uuid>,
    /// Participants a package was taken from this tick, so a losing steal
    /// against an already-robbed (or just-died) target reports AlreadyTaken
    /// rather than NotEligible
    tick_taken_from: HashMap<Uuid, Uuid>,
}

impl OwnershipResolver {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            pickup_radius: config.pickup_radius,
            steal_range: config.steal_range,
            deliver_radius: config.deliver_radius,
            tick_mutated: HashSet::new(),
            tick_taken_from: HashMap::new(),
        }
    }

    /// Reset per-tick arbitration state. Called once at every tick boundary
    /// before the request queue is drained.
    pub fn begin_tick(&mut self) {
        self.tick_mutated.clear();
        self.tick_taken_from.clear();
    }

    /// Pick up a spawned package within reach
    pub fn request_pickup(
        &mut self,
        world: &mut RoundWorld,
        who: Uuid,
        package_id: Uuid,
    ) -> Result<OwnershipChange, RequestError> {
        let participant = world.participant(who)?;
        if !participant.alive || participant.carrying.is_some() {
            return Err(RequestError::NotEligible);
        }
        if self.tick_mutated.contains(&package_id) {
            return Err(RequestError::AlreadyTaken);
        }

        let package = world.packages.get(package_id)?;
        if package.status != PackageStatus::Spawned {
            return Err(RequestError::NotEligible);
        }
        let position = world.position_of(who).ok_or(RequestError::NotEligible)?;
        if position.distance(package.position) > self.pickup_radius {
            return Err(RequestError::NotEligible);
        }

        world
            .packages
            .set_status(package_id, PackageStatus::Carried, Some(who), None)?;
        world.participant_mut(who)?.carrying = Some(package_id);
        self.tick_mutated.insert(package_id);

        Ok(OwnershipChange::PickedUp {
            package_id,
            carrier: who,
        })
    }

    /// Steal the package a nearby participant is carrying. Ownership moves
    /// atomically: no intermediate dropped state is ever observable.
    pub fn request_steal(
        &mut self,
        world: &mut RoundWorld,
        attacker: Uuid,
        target: Uuid,
    ) -> Result<OwnershipChange, RequestError> {
        let attacking = world.participant(attacker)?;
        if !attacking.alive || attacking.carrying.is_some() || attacker == target {
            return Err(RequestError::NotEligible);
        }

        let victim = world.participant(target)?;
        let package_id = match victim.carrying {
            Some(id) => id,
            // Someone already took it (or the victim died) this tick: the
            // losing steal reports contention, not a missing package.
            None if self.tick_taken_from.contains_key(&target) => {
                return Err(RequestError::AlreadyTaken)
            }
            None => return Err(RequestError::NotEligible),
        };
        if self.tick_mutated.contains(&package_id) {
            return Err(RequestError::AlreadyTaken);
        }

        let attacker_pos = world.position_of(attacker).ok_or(RequestError::NotEligible)?;
        let target_pos = world.position_of(target).ok_or(RequestError::NotEligible)?;
        if attacker_pos.distance(target_pos) > self.steal_range {
            return Err(RequestError::NotEligible);
        }

        world.packages.transfer_carrier(package_id, attacker)?;
        world.participant_mut(target)?.carrying = None;
        world.participant_mut(attacker)?.carrying = Some(package_id);
        self.tick_mutated.insert(package_id);
        self.tick_taken_from.insert(target, package_id);

        Ok(OwnershipChange::Stolen {
            package_id,
            from: target,
            to: attacker,
        })
    }

    /// Drop the carried package at the carrier's current position
    pub fn request_drop(
        &mut self,
        world: &mut RoundWorld,
        who: Uuid,
    ) -> Result<OwnershipChange, RequestError> {
        let package_id = world
            .participant(who)?
            .carrying
            .ok_or(RequestError::NotEligible)?;
        if self.tick_mutated.contains(&package_id) {
            return Err(RequestError::AlreadyTaken);
        }
        let position = world.position_of(who).ok_or(RequestError::NotEligible)?;

        self.release(world, who, package_id, position)?;
        Ok(OwnershipChange::Dropped {
            package_id,
            carrier: who,
            position,
        })
    }

    /// Deliver the carried package at the destination
    pub fn request_deliver(
        &mut self,
        world: &mut RoundWorld,
        who: Uuid,
    ) -> Result<OwnershipChange, RequestError> {
        let package_id = world
            .participant(who)?
            .carrying
            .ok_or(RequestError::NotEligible)?;
        if self.tick_mutated.contains(&package_id) {
            return Err(RequestError::AlreadyTaken);
        }
        let destination = world.destination.ok_or(RequestError::NotEligible)?;
        let position = world.position_of(who).ok_or(RequestError::NotEligible)?;
        if position.distance(destination) > self.deliver_radius {
            return Err(RequestError::NotEligible);
        }

        let haul_distance = world
            .packages
            .get(package_id)?
            .spawn_position
            .distance(destination);

        world
            .packages
            .set_status(package_id, PackageStatus::Delivered, None, None)?;
        let carrier = world.participant_mut(who)?;
        carrier.carrying = None;
        carrier.deliveries += 1;
        self.tick_mutated.insert(package_id);

        Ok(OwnershipChange::Delivered {
            package_id,
            carrier: who,
            haul_distance,
        })
    }

    /// Forced drop on death or disconnect. Runs in the same tick as the
    /// triggering event so a carried package never references a dead or
    /// absent participant across a tick boundary.
    pub fn force_drop(
        &mut self,
        world: &mut RoundWorld,
        who: Uuid,
        position: Vec2,
    ) -> Option<OwnershipChange> {
        let package_id = world.participants.get(&who)?.carrying?;
        self.release(world, who, package_id, position).ok()?;
        self.tick_taken_from.insert(who, package_id);
        Some(OwnershipChange::Dropped {
            package_id,
            carrier: who,
            position,
        })
    }

    fn release(
        &mut self,
        world: &mut RoundWorld,
        who: Uuid,
        package_id: Uuid,
        position: Vec2,
    ) -> Result<(), RequestError> {
        world
            .packages
            .set_status(package_id, PackageStatus::Spawned, None, Some(position))?;
        world.participant_mut(who)?.carrying = None;
        self.tick_mutated.insert(package_id);
        Ok(())
    }
}
