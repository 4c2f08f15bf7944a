//! Vehicle arena - struct-of-arrays vehicle state
//!
//! Positions, velocities and health live in parallel vectors so the per-tick
//! batch update walks contiguous memory. A side map from vehicle id to slot
//! keeps id-based lookups cheap; removal swap-pops every column.

use std::collections::HashMap;

use uuid::Uuid;

use crate::net::protocol::{Vec2, VehicleKind, WeaponKind};

/// Chassis constants per vehicle kind
#[derive(Debug, Clone, Copy)]
pub struct VehicleStats {
    pub max_health: f32,
    /// Mass drives momentum-split collision damage
    pub mass: f32,
    pub hitbox_radius: f32,
    /// Weapon mount slots, indexed by `Fire { slot }`
    pub mounts: &'static [WeaponKind],
}

impl VehicleStats {
    pub fn for_kind(kind: VehicleKind) -> Self {
        match kind {
            VehicleKind::Runner => Self {
                max_health: 70.0,
                mass: 800.0,
                hitbox_radius: 16.0,
                mounts: &[WeaponKind::MachineGun],
            },
            VehicleKind::Hauler => Self {
                max_health: 110.0,
                mass: 1400.0,
                hitbox_radius: 24.0,
                mounts: &[WeaponKind::MachineGun, WeaponKind::Mortar],
            },
            VehicleKind::Interceptor => Self {
                max_health: 90.0,
                mass: 1000.0,
                hitbox_radius: 18.0,
                mounts: &[WeaponKind::Cannon, WeaponKind::MachineGun],
            },
            VehicleKind::Juggernaut => Self {
                max_health: 160.0,
                mass: 2600.0,
                hitbox_radius: 32.0,
                mounts: &[WeaponKind::Cannon, WeaponKind::Mortar],
            },
        }
    }
}

/// Vehicle pair overlap registered during a tick
#[derive(Debug, Clone, Copy)]
pub struct Impact {
    pub vehicle_a: Uuid,
    pub vehicle_b: Uuid,
    pub relative_speed: f32,
}

/// All live vehicles for the round, struct-of-arrays layout
#[derive(Debug, Default)]
pub struct VehicleArena {
    ids: Vec<Uuid>,
    owners: Vec<Uuid>,
    kinds: Vec<VehicleKind>,
    x: Vec<f32>,
    y: Vec<f32>,
    vel_x: Vec<f32>,
    vel_y: Vec<f32>,
    health: Vec<f32>,
    index: HashMap<Uuid, usize>,
}

impl VehicleArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a vehicle for a participant at the given position
    pub fn spawn(&mut self, owner: Uuid, kind: VehicleKind, position: Vec2) -> Uuid {
        let id = Uuid::new_v4();
        let stats = VehicleStats::for_kind(kind);
        let slot = self.ids.len();

        self.ids.push(id);
        self.owners.push(owner);
        self.kinds.push(kind);
        self.x.push(position.x);
        self.y.push(position.y);
        self.vel_x.push(0.0);
        self.vel_y.push(0.0);
        self.health.push(stats.max_health);
        self.index.insert(id, slot);
        id
    }

    /// Remove a vehicle, returning its last position
    pub fn remove(&mut self, id: Uuid) -> Option<Vec2> {
        let slot = self.index.remove(&id)?;
        let position = Vec2::new(self.x[slot], self.y[slot]);

        self.ids.swap_remove(slot);
        self.owners.swap_remove(slot);
        self.kinds.swap_remove(slot);
        self.x.swap_remove(slot);
        self.y.swap_remove(slot);
        self.vel_x.swap_remove(slot);
        self.vel_y.swap_remove(slot);
        self.health.swap_remove(slot);

        // The vehicle that got swapped into the hole needs its slot fixed.
        if slot < self.ids.len() {
            self.index.insert(self.ids[slot], slot);
        }
        Some(position)
    }

    /// Batch position update for every vehicle
    pub fn integrate(&mut self, dt: f32) {
        for i in 0..self.ids.len() {
            self.x[i] += self.vel_x[i] * dt;
            self.y[i] += self.vel_y[i] * dt;
        }
    }

    pub fn position(&self, id: Uuid) -> Option<Vec2> {
        self.index.get(&id).map(|&i| Vec2::new(self.x[i], self.y[i]))
    }

    pub fn set_position(&mut self, id: Uuid, position: Vec2) {
        if let Some(&i) = self.index.get(&id) {
            self.x[i] = position.x;
            self.y[i] = position.y;
        }
    }

    pub fn velocity(&self, id: Uuid) -> Option<Vec2> {
        self.index
            .get(&id)
            .map(|&i| Vec2::new(self.vel_x[i], self.vel_y[i]))
    }

    pub fn set_velocity(&mut self, id: Uuid, velocity: Vec2) {
        if let Some(&i) = self.index.get(&id) {
            self.vel_x[i] = velocity.x;
            self.vel_y[i] = velocity.y;
        }
    }

    pub fn kind(&self, id: Uuid) -> Option<VehicleKind> {
        self.index.get(&id).map(|&i| self.kinds[i])
    }

    /// Participant driving this vehicle
    pub fn owner(&self, id: Uuid) -> Option<Uuid> {
        self.index.get(&id).map(|&i| self.owners[i])
    }

    pub fn health(&self, id: Uuid) -> Option<f32> {
        self.index.get(&id).map(|&i| self.health[i])
    }

    /// Decrement health, returns (new_health, destroyed)
    pub fn apply_damage(&mut self, id: Uuid, amount: f32) -> Option<(f32, bool)> {
        let &i = self.index.get(&id)?;
        self.health[i] = (self.health[i] - amount).max(0.0);
        Some((self.health[i], self.health[i] <= 0.0))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.owners.clear();
        self.kinds.clear();
        self.x.clear();
        self.y.clear();
        self.vel_x.clear();
        self.vel_y.clear();
        self.health.clear();
        self.index.clear();
    }

    /// Detect overlapping vehicle pairs, push them apart, and report the
    /// relative impact speed of each pair for collision damage.
    pub fn resolve_collisions(&mut self) -> Vec<Impact> {
        let mut impacts = Vec::new();

        for i in 0..self.ids.len() {
            for j in (i + 1)..self.ids.len() {
                let r1 = VehicleStats::for_kind(self.kinds[i]).hitbox_radius;
                let r2 = VehicleStats::for_kind(self.kinds[j]).hitbox_radius;

                let dx = self.x[j] - self.x[i];
                let dy = self.y[j] - self.y[i];
                let dist_sq = dx * dx + dy * dy;
                let combined = r1 + r2;
                if dist_sq > combined * combined {
                    continue;
                }

                let rel_x = self.vel_x[j] - self.vel_x[i];
                let rel_y = self.vel_y[j] - self.vel_y[i];
                let relative_speed = (rel_x * rel_x + rel_y * rel_y).sqrt();

                impacts.push(Impact {
                    vehicle_a: self.ids[i],
                    vehicle_b: self.ids[j],
                    relative_speed,
                });

                // Push apart by half the overlap each, small buffer so the
                // pair does not re-collide next tick.
                let dist = dist_sq.sqrt();
                let (nx, ny) = if dist < 0.001 {
                    (1.0, 0.0)
                } else {
                    (dx / dist, dy / dist)
                };
                let push = (combined - dist) / 2.0 + 0.1;
                self.x[i] -= nx * push;
                self.y[i] -= ny * push;
                self.x[j] += nx * push;
                self.y[j] += ny * push;
            }
        }

        impacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_and_remove_keep_slots_consistent() {
        let mut arena = VehicleArena::new();
        let a = arena.spawn(Uuid::new_v4(), VehicleKind::Runner, Vec2::new(0.0, 0.0));
        let b = arena.spawn(Uuid::new_v4(), VehicleKind::Hauler, Vec2::new(100.0, 0.0));
        let c = arena.spawn(Uuid::new_v4(), VehicleKind::Juggernaut, Vec2::new(200.0, 0.0));

        // Removing the first slot swaps the last vehicle into it
        assert_eq!(arena.remove(a), Some(Vec2::new(0.0, 0.0)));
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.position(c), Some(Vec2::new(200.0, 0.0)));
        assert_eq!(arena.position(b), Some(Vec2::new(100.0, 0.0)));
        assert_eq!(arena.kind(c), Some(VehicleKind::Juggernaut));
        assert!(arena.position(a).is_none());
    }

    #[test]
    fn integrate_moves_all_vehicles() {
        let mut arena = VehicleArena::new();
        let a = arena.spawn(Uuid::new_v4(), VehicleKind::Runner, Vec2::new(0.0, 0.0));
        let b = arena.spawn(Uuid::new_v4(), VehicleKind::Hauler, Vec2::new(10.0, 10.0));
        arena.set_velocity(a, Vec2::new(30.0, 0.0));
        arena.set_velocity(b, Vec2::new(0.0, -15.0));

        arena.integrate(1.0);

        assert_eq!(arena.position(a), Some(Vec2::new(30.0, 0.0)));
        assert_eq!(arena.position(b), Some(Vec2::new(10.0, -5.0)));
    }

    #[test]
    fn damage_floors_at_zero_and_reports_destruction() {
        let mut arena = VehicleArena::new();
        let a = arena.spawn(Uuid::new_v4(), VehicleKind::Runner, Vec2::new(0.0, 0.0));
        let (health, destroyed) = arena.apply_damage(a, 50.0).unwrap();
        assert_eq!(health, 20.0);
        assert!(!destroyed);
        let (health, destroyed) = arena.apply_damage(a, 999.0).unwrap();
        assert_eq!(health, 0.0);
        assert!(destroyed);
    }

    #[test]
    fn overlapping_vehicles_are_pushed_apart() {
        let mut arena = VehicleArena::new();
        let a = arena.spawn(Uuid::new_v4(), VehicleKind::Hauler, Vec2::new(0.0, 0.0));
        let b = arena.spawn(Uuid::new_v4(), VehicleKind::Hauler, Vec2::new(10.0, 0.0));
        arena.set_velocity(a, Vec2::new(120.0, 0.0));
        arena.set_velocity(b, Vec2::new(-120.0, 0.0));

        let impacts = arena.resolve_collisions();
        assert_eq!(impacts.len(), 1);
        assert!((impacts[0].relative_speed - 240.0).abs() < 0.01);

        let radius = VehicleStats::for_kind(VehicleKind::Hauler).hitbox_radius;
        let dist = arena.position(a).unwrap().distance(arena.position(b).unwrap());
        assert!(dist >= radius * 2.0);
    }

    #[test]
    fn separated_vehicles_do_not_collide() {
        let mut arena = VehicleArena::new();
        arena.spawn(Uuid::new_v4(), VehicleKind::Runner, Vec2::new(0.0, 0.0));
        arena.spawn(Uuid::new_v4(), VehicleKind::Runner, Vec2::new(500.0, 0.0));
        assert!(arena.resolve_collisions().is_empty());
    }
}
