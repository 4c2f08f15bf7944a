//! Round state machine and authoritative tick loop
//!
//! Phases cycle `Lobby → Spawning → Active → Scoring → Cooldown → Lobby`
//! forever; there is no terminal state. [`RoundState`] holds all simulation
//! logic as synchronous methods driven once per tick; [`GameRound`] is the
//! async shell that owns the request queue, the tick interval and the
//! outbound event broadcast.

use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::error::RequestError;
use crate::net::protocol::{ClientAction, ParticipantInfo, ServerEvent, VehicleKind};
use crate::store::{ProfileStore, SavedProfile};
use crate::util::time::{tick_delta, unix_millis, TICK_DURATION_MICROS};

use super::combat::{CollisionEvent, DamageModel, DamageOutcome, FireEvent};
use super::economy::{EconomyLedger, LedgerReason};
use super::ownership::{OwnershipChange, OwnershipResolver};
use super::packages::PackageStatus;
use super::spawn::SpawnPlanner;
use super::{ActionRequest, ControlMsg, Participant, RoundWorld};

/// Round phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Accepting participants
    Lobby,
    /// Committing spawn results
    Spawning,
    /// Contention: pickups, steals, combat, deliveries
    Active,
    /// Settling end-of-round ledger entries
    Scoring,
    /// Shop window before the next round
    Cooldown,
}

/// Authoritative state of one round cycle (owned by the round task)
pub struct RoundState {
    pub id: Uuid,
    pub seed: u64,
    pub phase: RoundPhase,
    pub tick: u64,
    pub config: GameConfig,
    pub world: RoundWorld,
    pub ledger: Arc<EconomyLedger>,

    resolver: OwnershipResolver,
    damage: DamageModel,
    profiles: Arc<dyn ProfileStore>,
    rng: ChaCha8Rng,

    phase_timer: f32,
    countdown_running: bool,
}

impl RoundState {
    pub fn new(
        seed: u64,
        config: GameConfig,
        ledger: Arc<EconomyLedger>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            seed,
            phase: RoundPhase::Lobby,
            tick: 0,
            resolver: OwnershipResolver::new(&config),
            damage: DamageModel::new(&config),
            config,
            world: RoundWorld::default(),
            ledger,
            profiles,
            rng: ChaCha8Rng::seed_from_u64(seed),
            phase_timer: 0.0,
            countdown_running: false,
        }
    }

    /// Open a new tick: bump the counter and reset per-tick arbitration
    /// state. Queued requests are applied after this, then [`Self::tick`].
    pub fn begin_tick(&mut self) {
        self.tick += 1;
        self.resolver.begin_tick();
        self.damage.prune(self.tick);
    }

    /// Apply one queued action request. Rejections surface as `Rejected`
    /// events and change nothing.
    pub fn apply_action(&mut self, participant_id: Uuid, action: ClientAction) -> Vec<ServerEvent> {
        let result = match action {
            ClientAction::Join {
                display_name,
                vehicle_kind,
            } => self.handle_join(participant_id, display_name, vehicle_kind),
            ClientAction::Leave => Ok(self.handle_leave(participant_id, "left")),
            ClientAction::Pickup { package_id } => self.active_only(|s| {
                let change = s.resolver.request_pickup(&mut s.world, participant_id, package_id)?;
                Ok(s.change_events(change))
            }),
            ClientAction::Steal { target_id } => self.active_only(|s| {
                let change = s.resolver.request_steal(&mut s.world, participant_id, target_id)?;
                Ok(s.change_events(change))
            }),
            ClientAction::Drop => self.active_only(|s| {
                let change = s.resolver.request_drop(&mut s.world, participant_id)?;
                Ok(s.change_events(change))
            }),
            ClientAction::Deliver => self.active_only(|s| {
                let change = s.resolver.request_deliver(&mut s.world, participant_id)?;
                Ok(s.change_events(change))
            }),
            ClientAction::Fire {
                event_id,
                target_id,
                slot,
            } => self.active_only(|s| {
                s.handle_fire(FireEvent {
                    event_id,
                    attacker: participant_id,
                    target: target_id,
                    slot,
                })
            }),
            ClientAction::Purchase { item_id, price } => {
                self.handle_purchase(participant_id, item_id, price)
            }
        };

        match result {
            Ok(events) => events,
            Err(err) => vec![ServerEvent::Rejected {
                participant_id,
                code: err.code().to_string(),
                message: err.to_string(),
            }],
        }
    }

    /// Run one simulation tick: phase timers, physics, collisions, respawns
    pub fn tick(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        let dt = tick_delta();

        match self.phase {
            RoundPhase::Lobby => {
                if self.world.participants.len() >= self.config.min_participants {
                    if !self.countdown_running {
                        self.countdown_running = true;
                        self.phase_timer = self.config.lobby_countdown;
                        info!(round_id = %self.id, "Lobby threshold met, countdown started");
                    }
                    self.phase_timer -= dt;
                    if self.phase_timer <= 0.0 {
                        events.extend(self.enter_spawning());
                    }
                } else {
                    self.countdown_running = false;
                }
            }
            // Spawning commits and transitions inside enter_spawning; the
            // tick loop never observes it as a resting phase.
            RoundPhase::Spawning => {}
            RoundPhase::Active => {
                self.world.vehicles.integrate(dt);
                events.extend(self.run_collisions());
                events.extend(self.run_respawns(dt));

                self.phase_timer -= dt;
                let all_delivered = self.world.packages.total() > 0
                    && self.world.packages.delivered_count() == self.world.packages.total();
                if self.phase_timer <= 0.0 || all_delivered {
                    events.extend(self.enter_scoring());
                }
            }
            RoundPhase::Scoring => {
                self.phase_timer -= dt;
                if self.phase_timer <= 0.0 {
                    self.phase = RoundPhase::Cooldown;
                    self.phase_timer = self.config.cooldown_duration;
                    events.push(self.phase_event());
                }
            }
            RoundPhase::Cooldown => {
                self.phase_timer -= dt;
                if self.phase_timer <= 0.0 {
                    events.extend(self.reset_round());
                }
            }
        }

        events
    }

    /// Force the round out of `Active` early. Queued requests must already
    /// have been discarded by the caller; nothing here partially applies.
    pub fn force_end(&mut self) -> Vec<ServerEvent> {
        if self.phase != RoundPhase::Active {
            return Vec::new();
        }
        info!(round_id = %self.id, tick = self.tick, "Round ended early by control message");
        self.enter_scoring()
    }

    fn active_only<F>(&mut self, f: F) -> Result<Vec<ServerEvent>, RequestError>
    where
        F: FnOnce(&mut Self) -> Result<Vec<ServerEvent>, RequestError>,
    {
        if self.phase != RoundPhase::Active {
            return Err(RequestError::WrongPhase);
        }
        f(self)
    }

    fn phase_event(&self) -> ServerEvent {
        ServerEvent::RoundPhaseChanged {
            phase: self.phase,
            tick: self.tick,
        }
    }

    // --- join / leave -----------------------------------------------------

    fn handle_join(
        &mut self,
        participant_id: Uuid,
        display_name: String,
        vehicle_kind: VehicleKind,
    ) -> Result<Vec<ServerEvent>, RequestError> {
        if self.phase != RoundPhase::Lobby {
            return Err(RequestError::WrongPhase);
        }
        if self.world.participants.contains_key(&participant_id) {
            return Err(RequestError::NotEligible);
        }

        // Round entry is the only persistence read the core performs.
        let profile = self.profiles.load(participant_id).unwrap_or(SavedProfile {
            display_name: None,
            currency: self.config.starting_balance,
            owned_vehicles: vec![VehicleKind::Runner],
        });

        let kind = if profile.owned_vehicles.contains(&vehicle_kind) {
            vehicle_kind
        } else {
            warn!(participant_id = %participant_id, "Requested vehicle not owned, using runner");
            VehicleKind::Runner
        };

        self.ledger.open_account(participant_id, profile.currency);
        let balance = self.ledger.balance(participant_id)?;

        self.world.participants.insert(
            participant_id,
            Participant::new(participant_id, display_name.clone(), kind),
        );

        info!(
            round_id = %self.id,
            participant_id = %participant_id,
            participant_count = self.world.participants.len(),
            "Participant joined round"
        );

        Ok(vec![
            ServerEvent::ParticipantJoined {
                participant: ParticipantInfo {
                    participant_id,
                    display_name,
                    vehicle_kind: kind,
                },
            },
            ServerEvent::BalanceChanged {
                participant_id,
                balance,
                reason: LedgerReason::Opening,
            },
        ])
    }

    /// Disconnection is not an error path: the carried package is force
    /// dropped in this same tick and the profile is written back.
    fn handle_leave(&mut self, participant_id: Uuid, reason: &str) -> Vec<ServerEvent> {
        if !self.world.participants.contains_key(&participant_id) {
            return Vec::new();
        }
        let mut events = Vec::new();

        let position = self
            .world
            .position_of(participant_id)
            .unwrap_or_else(|| self.world.participants[&participant_id].last_position);
        if let Some(change) = self.resolver.force_drop(&mut self.world, participant_id, position) {
            events.extend(self.change_events(change));
        }
        self.world.retire_vehicle(participant_id);
        self.world.participants.remove(&participant_id);
        self.persist_and_close(participant_id);

        info!(
            round_id = %self.id,
            participant_id = %participant_id,
            reason = reason,
            "Participant left round"
        );

        events.push(ServerEvent::ParticipantLeft {
            participant_id,
            reason: reason.to_string(),
        });
        events
    }

    // --- combat -----------------------------------------------------------

    fn handle_fire(&mut self, event: FireEvent) -> Result<Vec<ServerEvent>, RequestError> {
        let outcomes = self
            .damage
            .apply_fire(&mut self.world, &mut self.rng, event, self.tick)?;
        Ok(self.process_outcomes(outcomes))
    }

    fn run_collisions(&mut self) -> Vec<ServerEvent> {
        let impacts = self.world.vehicles.resolve_collisions();
        let mut events = Vec::new();
        for impact in impacts {
            let outcomes = self.damage.apply_collision(
                &mut self.world,
                CollisionEvent {
                    event_id: Uuid::new_v4(),
                    vehicle_a: impact.vehicle_a,
                    vehicle_b: impact.vehicle_b,
                    relative_speed: impact.relative_speed,
                },
                self.tick,
            );
            events.extend(self.process_outcomes(outcomes));
        }
        events
    }

    fn process_outcomes(&mut self, outcomes: Vec<DamageOutcome>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        for outcome in outcomes {
            if let Some(target) = self.world.participants.get_mut(&outcome.target) {
                target.damage_taken += outcome.amount;
            }
            if let Some(attacker_id) = outcome.attacker {
                if let Some(attacker) = self.world.participants.get_mut(&attacker_id) {
                    attacker.damage_dealt += outcome.amount;
                    if outcome.killed {
                        attacker.kills += 1;
                    }
                }
            }

            events.push(ServerEvent::DamageApplied {
                event_id: outcome.event_id,
                target_id: outcome.target,
                amount: outcome.amount,
                attacker_id: outcome.attacker,
                cause: outcome.cause.to_string(),
            });

            if outcome.killed {
                events.extend(self.kill_participant(outcome.target, outcome.attacker));
            }
        }
        events
    }

    fn kill_participant(&mut self, victim: Uuid, killer: Option<Uuid>) -> Vec<ServerEvent> {
        let Some(position) = self.world.position_of(victim) else {
            return Vec::new(); // already dead this tick
        };
        let mut events = Vec::new();

        // Same-tick forced drop keeps the carrier invariant: no package may
        // reference a dead participant across a tick boundary.
        if let Some(change) = self.resolver.force_drop(&mut self.world, victim, position) {
            events.extend(self.change_events(change));
        }
        self.world.retire_vehicle(victim);
        if let Some(participant) = self.world.participants.get_mut(&victim) {
            participant.alive = false;
            participant.respawn_timer = self.config.respawn_delay;
        }

        info!(round_id = %self.id, participant_id = %victim, "Participant destroyed");
        events.push(ServerEvent::Death {
            participant_id: victim,
            killer_id: killer,
        });
        events
    }

    fn run_respawns(&mut self, dt: f32) -> Vec<ServerEvent> {
        let due: Vec<Uuid> = self
            .world
            .participants
            .values_mut()
            .filter(|p| !p.alive)
            .filter_map(|p| {
                p.respawn_timer -= dt;
                (p.respawn_timer <= 0.0).then_some(p.id)
            })
            .collect();

        let mut events = Vec::new();
        for id in due {
            let position = self.config.map.sample(&mut self.rng);
            let kind = self.world.participants[&id].vehicle_kind;
            let vehicle = self.world.vehicles.spawn(id, kind, position);
            if let Some(participant) = self.world.participants.get_mut(&id) {
                participant.vehicle = Some(vehicle);
                participant.alive = true;
            }
            events.push(ServerEvent::Respawn {
                participant_id: id,
                position,
            });
        }
        events
    }

    // --- economy ----------------------------------------------------------

    fn handle_purchase(
        &mut self,
        participant_id: Uuid,
        item_id: Uuid,
        price: i64,
    ) -> Result<Vec<ServerEvent>, RequestError> {
        // The shop window is the cooldown; purchases also go through while
        // the round is active.
        if !matches!(self.phase, RoundPhase::Active | RoundPhase::Cooldown) {
            return Err(RequestError::WrongPhase);
        }
        if price <= 0 {
            return Err(RequestError::NotEligible);
        }

        let balance = self
            .ledger
            .debit(participant_id, price, LedgerReason::Purchase)?;
        info!(
            participant_id = %participant_id,
            item_id = %item_id,
            price = price,
            "Purchase debited"
        );
        Ok(vec![ServerEvent::BalanceChanged {
            participant_id,
            balance,
            reason: LedgerReason::Purchase,
        }])
    }

    fn delivery_reward(&self, haul_distance: f32) -> i64 {
        self.config.base_reward + (self.config.distance_factor * haul_distance).round() as i64
    }

    /// Translate an accepted ownership change into outbound events,
    /// crediting the delivery reward where one applies.
    fn change_events(&mut self, change: OwnershipChange) -> Vec<ServerEvent> {
        match change {
            OwnershipChange::PickedUp { package_id, carrier } => {
                vec![ServerEvent::PackageStatusChanged {
                    package_id,
                    status: PackageStatus::Carried,
                    carrier_id: Some(carrier),
                    position: None,
                }]
            }
            OwnershipChange::Stolen { package_id, to, .. } => {
                vec![ServerEvent::PackageStatusChanged {
                    package_id,
                    status: PackageStatus::Carried,
                    carrier_id: Some(to),
                    position: None,
                }]
            }
            OwnershipChange::Dropped {
                package_id,
                position,
                ..
            } => vec![ServerEvent::PackageStatusChanged {
                package_id,
                status: PackageStatus::Spawned,
                carrier_id: None,
                position: Some(position),
            }],
            OwnershipChange::Delivered {
                package_id,
                carrier,
                haul_distance,
            } => {
                let reward = self.delivery_reward(haul_distance);
                let mut events = vec![ServerEvent::PackageStatusChanged {
                    package_id,
                    status: PackageStatus::Delivered,
                    carrier_id: None,
                    position: None,
                }];
                match self.ledger.credit(carrier, reward, LedgerReason::Delivery) {
                    Ok(balance) => {
                        events.push(ServerEvent::Delivery {
                            participant_id: carrier,
                            package_id,
                            reward,
                        });
                        events.push(ServerEvent::BalanceChanged {
                            participant_id: carrier,
                            balance,
                            reason: LedgerReason::Delivery,
                        });
                    }
                    Err(err) => {
                        warn!(participant_id = %carrier, error = %err, "Delivery credit failed");
                    }
                }
                info!(
                    round_id = %self.id,
                    participant_id = %carrier,
                    package_id = %package_id,
                    delivered = self.world.packages.delivered_count(),
                    "Package delivered"
                );
                events
            }
        }
    }

    // --- phase transitions --------------------------------------------------

    /// Commit spawn results and move straight on to `Active`.
    fn enter_spawning(&mut self) -> Vec<ServerEvent> {
        self.phase = RoundPhase::Spawning;
        self.countdown_running = false;
        let mut events = vec![self.phase_event()];

        let plan = SpawnPlanner::plan(
            &self.config.map,
            self.world.participants.len(),
            self.config.max_packages,
            self.config.spawn_attempts,
            &mut self.rng,
        );
        let package_ids = self.world.packages.spawn_all(&plan.package_positions);
        self.world.destination = Some(plan.destination);

        // Every participant gets a fresh vehicle for the round.
        let ids: Vec<Uuid> = self.world.participants.keys().copied().collect();
        for id in ids {
            let position = self.config.map.sample(&mut self.rng);
            let kind = self.world.participants[&id].vehicle_kind;
            let vehicle = self.world.vehicles.spawn(id, kind, position);
            if let Some(p) = self.world.participants.get_mut(&id) {
                p.vehicle = Some(vehicle);
                p.alive = true;
            }
        }

        info!(
            round_id = %self.id,
            packages = package_ids.len(),
            participants = self.world.participants.len(),
            "Spawn results committed"
        );

        events.push(ServerEvent::SpawnCommitted {
            round_id: self.id,
            package_positions: package_ids
                .iter()
                .filter_map(|&id| {
                    self.world.packages.get(id).ok().map(|p| (id, p.position))
                })
                .collect(),
            destination: plan.destination,
        });

        self.phase = RoundPhase::Active;
        self.phase_timer = self.config.active_duration;
        events.push(self.phase_event());
        events
    }

    /// Settle end-of-round bonuses into the ledger.
    fn enter_scoring(&mut self) -> Vec<ServerEvent> {
        self.phase = RoundPhase::Scoring;
        self.phase_timer = self.config.scoring_duration;
        let mut events = vec![self.phase_event()];

        let kill_credits: Vec<(Uuid, i64)> = self
            .world
            .participants
            .values()
            .filter(|p| p.kills > 0)
            .map(|p| (p.id, p.kills as i64 * self.config.kill_credit))
            .collect();
        for (id, amount) in kill_credits {
            if let Ok(balance) = self.ledger.credit(id, amount, LedgerReason::Kill) {
                events.push(ServerEvent::BalanceChanged {
                    participant_id: id,
                    balance,
                    reason: LedgerReason::Kill,
                });
            }
        }

        info!(
            round_id = %self.id,
            delivered = self.world.packages.delivered_count(),
            total = self.world.packages.total(),
            "Round scoring"
        );
        events
    }

    /// Tear the round down at cooldown end and cycle back to the lobby.
    fn reset_round(&mut self) -> Vec<ServerEvent> {
        let ids: Vec<Uuid> = self.world.participants.keys().copied().collect();
        for id in ids {
            self.persist_and_close(id);
        }

        self.world.participants.clear();
        self.world.packages.clear();
        self.world.vehicles.clear();
        self.world.destination = None;
        self.resolver = OwnershipResolver::new(&self.config);
        self.damage = DamageModel::new(&self.config);

        info!(round_id = %self.id, "Round reset, returning to lobby");

        self.id = Uuid::new_v4();
        self.seed = self.rng.gen();
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.phase = RoundPhase::Lobby;
        self.countdown_running = false;

        vec![self.phase_event()]
    }

    /// Write the final balance back through the persistence seam and close
    /// the ledger account. Store implementations are expected to queue the
    /// write; the tick never waits on storage.
    fn persist_and_close(&mut self, participant_id: Uuid) {
        let Some(balance) = self.ledger.close_account(participant_id) else {
            return;
        };
        let mut profile = self.profiles.load(participant_id).unwrap_or_default();
        profile.currency = balance;
        if let Some(p) = self.world.participants.get(&participant_id) {
            profile.display_name = Some(p.display_name.clone());
            if !profile.owned_vehicles.contains(&p.vehicle_kind) {
                profile.owned_vehicles.push(p.vehicle_kind);
            }
        }
        self.profiles.save(participant_id, profile);
    }
}

/// Handle to a running round task
#[derive(Clone)]
pub struct RoundHandle {
    pub action_tx: mpsc::Sender<ActionRequest>,
    pub control_tx: mpsc::Sender<ControlMsg>,
    pub event_tx: broadcast::Sender<ServerEvent>,
}

impl RoundHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.event_tx.subscribe()
    }
}

/// Queue age above which a drained request is logged as stale
const STALE_REQUEST_MILLIS: u64 = 250;

/// The authoritative round task: drains queued requests and advances the
/// simulation once per tick, then broadcasts the tick's events.
pub struct GameRound {
    state: RoundState,
    action_rx: mpsc::Receiver<ActionRequest>,
    control_rx: mpsc::Receiver<ControlMsg>,
    event_tx: broadcast::Sender<ServerEvent>,
}

impl GameRound {
    pub fn new(
        seed: u64,
        config: GameConfig,
        ledger: Arc<EconomyLedger>,
        profiles: Arc<dyn ProfileStore>,
    ) -> (Self, RoundHandle) {
        let (action_tx, action_rx) = mpsc::channel(256);
        let (control_tx, control_rx) = mpsc::channel(8);
        let (event_tx, _) = broadcast::channel(256);

        let handle = RoundHandle {
            action_tx,
            control_tx,
            event_tx: event_tx.clone(),
        };
        let round = Self {
            state: RoundState::new(seed, config, ledger, profiles),
            action_rx,
            control_rx,
            event_tx,
        };
        (round, handle)
    }

    /// Run the round loop until shutdown
    pub async fn run(mut self) {
        info!(round_id = %self.state.id, seed = self.state.seed, "Round loop started");

        let mut tick_interval = interval(Duration::from_micros(TICK_DURATION_MICROS));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            let mut events = Vec::new();
            let mut shutdown = false;

            while let Ok(msg) = self.control_rx.try_recv() {
                match msg {
                    ControlMsg::EndRound => {
                        // Discard queued requests without partial application.
                        let mut discarded = 0usize;
                        while self.action_rx.try_recv().is_ok() {
                            discarded += 1;
                        }
                        if discarded > 0 {
                            info!(discarded, "Discarded queued requests on forced round end");
                        }
                        events.extend(self.state.force_end());
                    }
                    ControlMsg::Shutdown => shutdown = true,
                }
            }

            self.state.begin_tick();
            while let Ok(request) = self.action_rx.try_recv() {
                let queued_ms = unix_millis().saturating_sub(request.received_at);
                if queued_ms > STALE_REQUEST_MILLIS {
                    warn!(
                        participant_id = %request.participant_id,
                        queued_ms,
                        "Action request sat queued well past a tick"
                    );
                }
                events.extend(
                    self.state
                        .apply_action(request.participant_id, request.action),
                );
            }
            events.extend(self.state.tick());

            for event in events {
                // Nobody listening is fine; notification is fire-and-forget.
                let _ = self.event_tx.send(event);
            }

            if shutdown {
                info!(round_id = %self.state.id, "Round loop shut down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::Vec2;
    use crate::store::MemoryProfileStore;

    fn test_state(min_participants: usize) -> RoundState {
        let mut config = GameConfig::default();
        config.min_participants = min_participants;
        config.lobby_countdown = 0.0;
        RoundState::new(
            42,
            config,
            Arc::new(EconomyLedger::new()),
            Arc::new(MemoryProfileStore::new()),
        )
    }

    fn join(state: &mut RoundState) -> Uuid {
        let id = Uuid::new_v4();
        let events = state.apply_action(
            id,
            ClientAction::Join {
                display_name: "driver".to_string(),
                vehicle_kind: VehicleKind::Runner,
            },
        );
        assert!(matches!(&events[0], ServerEvent::ParticipantJoined { .. }));
        id
    }

    fn advance(state: &mut RoundState) -> Vec<ServerEvent> {
        state.begin_tick();
        state.tick()
    }

    #[test]
    fn join_reports_the_opening_balance() {
        let mut state = test_state(2);
        let events = state.apply_action(
            Uuid::new_v4(),
            ClientAction::Join {
                display_name: "driver".to_string(),
                vehicle_kind: VehicleKind::Runner,
            },
        );
        assert!(matches!(
            &events[1],
            ServerEvent::BalanceChanged {
                reason: LedgerReason::Opening,
                balance,
                ..
            } if *balance == state.config.starting_balance
        ));
    }

    #[test]
    fn lobby_starts_round_when_threshold_met() {
        let mut state = test_state(2);
        join(&mut state);
        assert_eq!(state.phase, RoundPhase::Lobby);
        advance(&mut state);
        assert_eq!(state.phase, RoundPhase::Lobby);

        join(&mut state);
        let events = advance(&mut state);
        assert_eq!(state.phase, RoundPhase::Active);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::SpawnCommitted { .. })));
    }

    #[test]
    fn scarcity_holds_at_spawn_commit() {
        let mut state = test_state(2);
        for _ in 0..10 {
            join(&mut state);
        }
        advance(&mut state);
        assert_eq!(state.phase, RoundPhase::Active);
        assert!(state.world.packages.total() < state.world.participants.len());
        assert_eq!(state.world.packages.total(), 6); // min(max_packages, 9)
    }

    #[test]
    fn action_outside_active_is_wrong_phase() {
        let mut state = test_state(2);
        let id = join(&mut state);
        let events = state.apply_action(id, ClientAction::Deliver);
        match &events[0] {
            ServerEvent::Rejected { code, .. } => assert_eq!(code, "wrong_phase"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn join_outside_lobby_is_wrong_phase() {
        let mut state = test_state(1);
        join(&mut state);
        advance(&mut state);
        assert_eq!(state.phase, RoundPhase::Active);

        let events = state.apply_action(
            Uuid::new_v4(),
            ClientAction::Join {
                display_name: "late".to_string(),
                vehicle_kind: VehicleKind::Runner,
            },
        );
        assert!(matches!(&events[0], ServerEvent::Rejected { code, .. } if code == "wrong_phase"));
    }

    #[test]
    fn leaving_carrier_releases_package_same_tick() {
        let mut state = test_state(2);
        let a = join(&mut state);
        let b = join(&mut state);
        advance(&mut state);

        // Teleport A onto a package, park B out of collision reach.
        let pkg = state.world.packages.iter().next().unwrap().id;
        let pkg_pos = state.world.packages.get(pkg).unwrap().position;
        let va = state.world.participants[&a].vehicle.unwrap();
        let vb = state.world.participants[&b].vehicle.unwrap();
        state.world.vehicles.set_position(va, pkg_pos);
        state
            .world
            .vehicles
            .set_position(vb, Vec2::new(-20_000.0, -20_000.0));

        state.begin_tick();
        state.apply_action(a, ClientAction::Pickup { package_id: pkg });
        assert_eq!(state.world.packages.get(pkg).unwrap().carrier, Some(a));
        state.tick();

        state.begin_tick();
        state.apply_action(a, ClientAction::Leave);
        state.tick();

        let package = state.world.packages.get(pkg).unwrap();
        assert_eq!(package.status, PackageStatus::Spawned);
        assert_eq!(package.carrier, None);
        assert_eq!(package.position, pkg_pos);
        assert!(!state.world.participants.contains_key(&a));
    }

    #[test]
    fn no_carried_package_references_dead_carrier_after_any_tick() {
        let mut state = test_state(2);
        let a = join(&mut state);
        let b = join(&mut state);
        advance(&mut state);

        let pkg = state.world.packages.iter().next().unwrap().id;
        let pkg_pos = state.world.packages.get(pkg).unwrap().position;
        let va = state.world.participants[&a].vehicle.unwrap();
        let vb = state.world.participants[&b].vehicle.unwrap();
        state.world.vehicles.set_position(va, pkg_pos);
        state
            .world
            .vehicles
            .set_position(vb, Vec2::new(pkg_pos.x + 30.0, pkg_pos.y));

        state.begin_tick();
        state.apply_action(a, ClientAction::Pickup { package_id: pkg });
        state.tick();

        // B shoots A dead over several ticks.
        for _ in 0..60 {
            state.begin_tick();
            state.apply_action(
                b,
                ClientAction::Fire {
                    event_id: Uuid::new_v4(),
                    target_id: a,
                    slot: 0,
                },
            );
            state.tick();

            for package in state.world.packages.in_contention() {
                if let Some(carrier) = package.carrier {
                    let p = &state.world.participants[&carrier];
                    assert!(p.alive, "carried package references dead carrier");
                }
            }
            if !state.world.participants[&a].alive {
                break;
            }
        }
        assert!(!state.world.participants[&a].alive);
        assert_eq!(state.world.packages.get(pkg).unwrap().carrier, None);
    }

    #[test]
    fn dead_participant_respawns_after_delay() {
        let mut state = test_state(2);
        let a = join(&mut state);
        let b = join(&mut state);
        advance(&mut state);

        let va = state.world.participants[&a].vehicle.unwrap();
        let vb = state.world.participants[&b].vehicle.unwrap();
        state.world.vehicles.set_position(va, Vec2::new(0.0, 0.0));
        state.world.vehicles.set_position(vb, Vec2::new(50.0, 0.0));

        // Runner has 70 hp; 12 machine-gun rounds at 6 damage kill it.
        for _ in 0..12 {
            state.begin_tick();
            state.apply_action(
                b,
                ClientAction::Fire {
                    event_id: Uuid::new_v4(),
                    target_id: a,
                    slot: 0,
                },
            );
            state.tick();
        }
        assert!(!state.world.participants[&a].alive);

        let respawn_ticks =
            (state.config.respawn_delay / tick_delta()).ceil() as usize + 2;
        let mut respawned = false;
        for _ in 0..respawn_ticks {
            let events = advance(&mut state);
            if events
                .iter()
                .any(|e| matches!(e, ServerEvent::Respawn { participant_id, .. } if *participant_id == a))
            {
                respawned = true;
                break;
            }
        }
        assert!(respawned);
        assert!(state.world.participants[&a].alive);
        assert!(state.world.participants[&a].vehicle.is_some());
    }

    #[test]
    fn purchase_is_allowed_in_cooldown_and_validates_funds() {
        let mut state = test_state(1);
        let a = join(&mut state);
        advance(&mut state);
        state.force_end();
        assert_eq!(state.phase, RoundPhase::Scoring);

        // Scoring rejects purchases.
        let events = state.apply_action(
            a,
            ClientAction::Purchase {
                item_id: Uuid::new_v4(),
                price: 10,
            },
        );
        assert!(matches!(&events[0], ServerEvent::Rejected { code, .. } if code == "wrong_phase"));

        // Run out the scoring timer into cooldown.
        let scoring_ticks = (state.config.scoring_duration / tick_delta()).ceil() as usize + 2;
        for _ in 0..scoring_ticks {
            advance(&mut state);
            if state.phase == RoundPhase::Cooldown {
                break;
            }
        }
        assert_eq!(state.phase, RoundPhase::Cooldown);

        let balance = state.ledger.balance(a).unwrap();
        let events = state.apply_action(
            a,
            ClientAction::Purchase {
                item_id: Uuid::new_v4(),
                price: balance + 1,
            },
        );
        assert!(
            matches!(&events[0], ServerEvent::Rejected { code, .. } if code == "insufficient_funds")
        );
        assert_eq!(state.ledger.balance(a).unwrap(), balance);

        let events = state.apply_action(
            a,
            ClientAction::Purchase {
                item_id: Uuid::new_v4(),
                price: balance,
            },
        );
        assert!(matches!(
            &events[0],
            ServerEvent::BalanceChanged { balance: 0, .. }
        ));
    }

    #[test]
    fn round_cycles_back_to_lobby_and_persists_balances() {
        let profiles = Arc::new(MemoryProfileStore::new());
        let mut config = GameConfig::default();
        config.min_participants = 1;
        config.lobby_countdown = 0.0;
        config.scoring_duration = 0.0;
        config.cooldown_duration = 0.0;
        let mut state = RoundState::new(
            7,
            config,
            Arc::new(EconomyLedger::new()),
            profiles.clone(),
        );

        let a = join(&mut state);
        advance(&mut state);
        assert_eq!(state.phase, RoundPhase::Active);
        let starting = state.ledger.balance(a).unwrap();

        state.force_end();
        advance(&mut state); // scoring -> cooldown
        advance(&mut state); // cooldown -> lobby reset
        assert_eq!(state.phase, RoundPhase::Lobby);
        assert!(state.world.participants.is_empty());
        assert_eq!(state.world.packages.total(), 0);

        let profile = profiles.load(a).expect("profile persisted at round exit");
        assert_eq!(profile.currency, starting);
    }
}
