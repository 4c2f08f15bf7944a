//! Spawn planning - package and destination placement
//!
//! Placement uses rejection sampling against a minimum pairwise separation,
//! bounded by an attempt budget. When the budget runs out the planner falls
//! back to a deterministic grid walk so planning always terminates, even on
//! maps too small for the requested separation.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::net::protocol::Vec2;

/// Valid-spawn region of a map
#[derive(Debug, Clone)]
pub struct MapDescriptor {
    /// Lower corner of the valid-spawn rectangle
    pub min: Vec2,
    /// Upper corner of the valid-spawn rectangle
    pub max: Vec2,
    /// Minimum pairwise distance between placed points
    pub min_separation: f32,
}

impl MapDescriptor {
    /// Sample a uniform point inside the valid-spawn region
    pub fn sample(&self, rng: &mut ChaCha8Rng) -> Vec2 {
        Vec2::new(
            rng.gen_range(self.min.x..=self.max.x),
            rng.gen_range(self.min.y..=self.max.y),
        )
    }
}

/// Result of a spawn plan: where packages and the destination go
#[derive(Debug, Clone)]
pub struct SpawnPlan {
    pub package_positions: Vec<Vec2>,
    pub destination: Vec2,
}

/// Procedural placement of round entities
pub struct SpawnPlanner;

impl SpawnPlanner {
    /// Number of packages for a round. Always strictly fewer than the
    /// participants so at least one player goes home empty-handed.
    pub fn package_count(max_packages: usize, participant_count: usize) -> usize {
        max_packages.min(participant_count.saturating_sub(1))
    }

    /// Plan package positions and the destination for a round.
    ///
    /// The destination is placed first and participates in the pairwise
    /// separation check like any package.
    pub fn plan(
        map: &MapDescriptor,
        participant_count: usize,
        max_packages: usize,
        max_attempts: usize,
        rng: &mut ChaCha8Rng,
    ) -> SpawnPlan {
        let package_count = Self::package_count(max_packages, participant_count);
        let needed = package_count + 1; // destination included

        let mut points: Vec<Vec2> = Vec::with_capacity(needed);
        let mut attempts = 0;

        while points.len() < needed && attempts < max_attempts {
            attempts += 1;
            let candidate = map.sample(rng);
            if Self::separated(&points, candidate, map.min_separation) {
                points.push(candidate);
            }
        }

        if points.len() < needed {
            Self::fill_from_grid(map, &mut points, needed);
        }

        let destination = points[0];
        SpawnPlan {
            package_positions: points.split_off(1),
            destination,
        }
    }

    fn separated(points: &[Vec2], candidate: Vec2, min_separation: f32) -> bool {
        points.iter().all(|p| p.distance(candidate) >= min_separation)
    }

    /// Deterministic grid walk over the spawn region. A first pass honors
    /// the separation threshold against already-placed points; if the grid
    /// cannot supply enough separated cells the second pass takes cells
    /// regardless, cycling until the plan is full.
    fn fill_from_grid(map: &MapDescriptor, points: &mut Vec<Vec2>, needed: usize) {
        let spacing = map.min_separation.max(1.0);
        let cols = (((map.max.x - map.min.x) / spacing).floor() as usize).max(1);
        let rows = (((map.max.y - map.min.y) / spacing).floor() as usize).max(1);

        let cell = |col: usize, row: usize| {
            Vec2::new(
                map.min.x + spacing * 0.5 + col as f32 * spacing,
                map.min.y + spacing * 0.5 + row as f32 * spacing,
            )
        };

        for row in 0..rows {
            for col in 0..cols {
                if points.len() >= needed {
                    return;
                }
                let candidate = cell(col, row);
                if Self::separated(points, candidate, map.min_separation) {
                    points.push(candidate);
                }
            }
        }

        // Map too small for the separation threshold: take grid cells as-is.
        let mut idx = 0;
        while points.len() < needed {
            points.push(cell(idx % cols, (idx / cols) % rows));
            idx += 1;
        }
    }
}
