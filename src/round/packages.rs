//! Package registry - authoritative state of every package in a round

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RequestError;
use crate::net::protocol::Vec2;
use crate::util::time::unix_millis;

/// Lifecycle of a package. `Delivered` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    /// On the ground, contestable
    Spawned,
    /// Held by a participant
    Carried,
    /// Turned in at the destination, out of contention
    Delivered,
}

/// A contestable package entity
#[derive(Debug, Clone)]
pub struct Package {
    pub id: Uuid,
    pub status: PackageStatus,
    /// Current world position; meaningful only while `Spawned`
    pub position: Vec2,
    /// Where the package first spawned, kept for distance-weighted rewards
    pub spawn_position: Vec2,
    /// Holder; meaningful only while `Carried`
    pub carrier: Option<Uuid>,
    pub spawned_at: u64,
}

/// Owns every package for the round. All status changes go through
/// [`PackageRegistry::set_status`], which enforces the transition graph:
/// Spawned→Carried, Carried→Spawned, Carried→Delivered, nothing else.
#[derive(Debug, Default)]
pub struct PackageRegistry {
    packages: HashMap<Uuid, Package>,
    delivered: usize,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the round's packages at the planned positions. Replaces any
    /// previous round's contents.
    pub fn spawn_all(&mut self, positions: &[Vec2]) -> Vec<Uuid> {
        self.packages.clear();
        self.delivered = 0;

        let now = unix_millis();
        positions
            .iter()
            .map(|&position| {
                let id = Uuid::new_v4();
                self.packages.insert(
                    id,
                    Package {
                        id,
                        status: PackageStatus::Spawned,
                        position,
                        spawn_position: position,
                        carrier: None,
                        spawned_at: now,
                    },
                );
                id
            })
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Result<&Package, RequestError> {
        self.packages.get(&id).ok_or(RequestError::NotFound)
    }

    /// Apply a status transition.
    ///
    /// `carrier` must be set when moving to `Carried` and is cleared
    /// otherwise. `position` records where the package lands when it
    /// returns to `Spawned`. Illegal transitions fail with
    /// `InvalidTransition` and leave the package untouched.
    pub fn set_status(
        &mut self,
        id: Uuid,
        status: PackageStatus,
        carrier: Option<Uuid>,
        position: Option<Vec2>,
    ) -> Result<(), RequestError> {
        let package = self.packages.get_mut(&id).ok_or(RequestError::NotFound)?;

        let allowed = matches!(
            (package.status, status),
            (PackageStatus::Spawned, PackageStatus::Carried)
                | (PackageStatus::Carried, PackageStatus::Spawned)
                | (PackageStatus::Carried, PackageStatus::Delivered)
        );
        if !allowed {
            return Err(RequestError::InvalidTransition);
        }

        match status {
            PackageStatus::Carried => {
                package.carrier = Some(carrier.ok_or(RequestError::NotEligible)?);
            }
            PackageStatus::Spawned => {
                package.carrier = None;
                if let Some(position) = position {
                    package.position = position;
                }
            }
            PackageStatus::Delivered => {
                package.carrier = None;
                self.delivered += 1;
            }
        }
        package.status = status;
        Ok(())
    }

    /// Reassign the carrier of a `Carried` package in one step. Used by
    /// steals so no intermediate dropped state is observable.
    pub fn transfer_carrier(&mut self, id: Uuid, new_carrier: Uuid) -> Result<(), RequestError> {
        let package = self.packages.get_mut(&id).ok_or(RequestError::NotFound)?;
        if package.status != PackageStatus::Carried {
            return Err(RequestError::InvalidTransition);
        }
        package.carrier = Some(new_carrier);
        Ok(())
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered
    }

    pub fn total(&self) -> usize {
        self.packages.len()
    }

    /// All packages still in contention (not delivered)
    pub fn in_contention(&self) -> impl Iterator<Item = &Package> {
        self.packages
            .values()
            .filter(|p| p.status != PackageStatus::Delivered)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    /// Drop everything at round reset
    pub fn clear(&mut self) {
        self.packages.clear();
        self.delivered = 0;
    }
}
