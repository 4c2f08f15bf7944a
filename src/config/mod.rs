//! Configuration module - environment variable parsing and gameplay tunables

use std::env;

use crate::net::protocol::Vec2;
use crate::round::spawn::MapDescriptor;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Fixed round seed for reproducible rounds (random when unset)
    pub round_seed: Option<u64>,
    /// Gameplay tunables
    pub game: GameConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut game = GameConfig::default();

        if let Ok(v) = env::var("MIN_PARTICIPANTS") {
            game.min_participants = v
                .parse()
                .map_err(|_| ConfigError::Invalid("MIN_PARTICIPANTS"))?;
        }
        if let Ok(v) = env::var("ACTIVE_DURATION_SECS") {
            game.active_duration = v
                .parse()
                .map_err(|_| ConfigError::Invalid("ACTIVE_DURATION_SECS"))?;
        }
        if let Ok(v) = env::var("MAX_PACKAGES") {
            game.max_packages = v.parse().map_err(|_| ConfigError::Invalid("MAX_PACKAGES"))?;
        }

        let round_seed = match env::var("ROUND_SEED") {
            Ok(v) => Some(v.parse().map_err(|_| ConfigError::Invalid("ROUND_SEED"))?),
            Err(_) => None,
        };

        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            round_seed,
            game,
        })
    }
}

/// Gameplay tunables for a round
///
/// Trigger ranges and the reward formula are deliberately parameters rather
/// than hard-coded values; the defaults here are the shipped balance pass.
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Participants required before the lobby countdown starts
    pub min_participants: usize,
    /// Lobby countdown once the threshold is met (seconds)
    pub lobby_countdown: f32,
    /// Active phase duration (seconds)
    pub active_duration: f32,
    /// Scoring phase duration (seconds)
    pub scoring_duration: f32,
    /// Cooldown phase duration, shop window (seconds)
    pub cooldown_duration: f32,

    /// World region packages and vehicles spawn in
    pub map: MapDescriptor,
    /// Upper bound on packages per round (scarcity cap)
    pub max_packages: usize,
    /// Rejection-sampling attempts before the grid fallback
    pub spawn_attempts: usize,

    /// Max distance at which a spawned package can be picked up
    pub pickup_radius: f32,
    /// Max distance at which a carried package can be stolen
    pub steal_range: f32,
    /// Max distance from the destination at which delivery counts
    pub deliver_radius: f32,

    /// Flat part of the delivery reward
    pub base_reward: i64,
    /// Reward added per world unit between package spawn and destination
    pub distance_factor: f32,
    /// End-of-round credit per kill
    pub kill_credit: i64,
    /// Currency granted to first-time players
    pub starting_balance: i64,

    /// Collision damage scale applied to the other vehicle's momentum
    pub collision_factor: f32,
    /// Relative impact speed below which collisions deal no damage
    pub min_impact_speed: f32,
    /// Seconds a dead participant waits before respawning
    pub respawn_delay: f32,
    /// Ticks a damage event id is remembered for duplicate discard
    pub dedup_window_ticks: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_participants: 2,
            lobby_countdown: 10.0,
            active_duration: 240.0,
            scoring_duration: 8.0,
            cooldown_duration: 20.0,

            map: MapDescriptor {
                min: Vec2::new(-1200.0, -1200.0),
                max: Vec2::new(1200.0, 1200.0),
                min_separation: 250.0,
            },
            max_packages: 6,
            spawn_attempts: 64,

            pickup_radius: 40.0,
            steal_range: 60.0,
            deliver_radius: 80.0,

            base_reward: 100,
            distance_factor: 0.05,
            kill_credit: 25,
            starting_balance: 500,

            collision_factor: 0.02,
            min_impact_speed: 80.0,
            respawn_delay: 5.0,
            dedup_window_ticks: 90,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
