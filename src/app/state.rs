//! Application state shared across the server

use std::sync::Arc;

use rand::Rng;

use crate::config::Config;
use crate::round::economy::EconomyLedger;
use crate::round::{GameRound, RoundHandle};
use crate::store::{MemoryProfileStore, ProfileStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub profiles: Arc<dyn ProfileStore>,
    pub ledger: Arc<EconomyLedger>,
    pub round: RoundHandle,
}

impl AppState {
    /// Wire up the shared services and the round task. The returned
    /// [`GameRound`] must be spawned by the caller.
    pub fn new(config: Config) -> (Self, GameRound) {
        let config = Arc::new(config);
        let profiles: Arc<dyn ProfileStore> = Arc::new(MemoryProfileStore::new());
        let ledger = Arc::new(EconomyLedger::new());

        let seed = config
            .round_seed
            .unwrap_or_else(|| rand::thread_rng().gen());
        let (round, handle) = GameRound::new(
            seed,
            config.game.clone(),
            ledger.clone(),
            profiles.clone(),
        );

        (
            Self {
                config,
                profiles,
                ledger,
                round: handle,
            },
            round,
        )
    }
}
