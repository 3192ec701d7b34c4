//! Lobby: one world instance, its sessions, and the fixed-interval tick
//!
//! A lobby's task exclusively owns its `World`. Client messages and tick
//! callbacks interleave on the same task via `select!`, so handlers run on
//! one logical timeline and never need locks around simulation state.
//! Handlers never block; persistence runs through `spawn_blocking` at
//! session end. A fault in one lobby never touches another.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{Identity, PlayerStore, StatsDelta};
use crate::config::SimulationConfig;
use crate::metrics::Metrics;
use crate::net::broadcast::BroadcastManager;
use crate::net::protocol::{
    AbilityKind, ClientMessage, CombatantSnapshot, ServerMessage, WorldEvent, WorldSnapshot,
};
use crate::net::session::{Session, SessionId};
use crate::util::vec2::Vec2;
use crate::world::combat::{self, DamageEffects};
use crate::world::constants::{ability, bounds, interest, net as net_consts, tick};
use crate::world::population;
use crate::world::region::CellKey;
use crate::world::scheduler::ScheduledAction;
use crate::world::state::{
    Combatant, CombatantClass, CombatantId, Controller, DamageSource, MinionId, TargetRef, World,
};
use crate::world::systems::bots::{self, BotState};
use crate::world::systems::{effects, enemies, minions};

/// Commands routed into a lobby task
pub enum LobbyCommand {
    Join {
        identity: Identity,
        name: String,
        class: CombatantClass,
        reply: oneshot::Sender<Result<JoinTicket, JoinError>>,
    },
    Message {
        session: SessionId,
        message: ClientMessage,
    },
    Disconnect { session: SessionId },
    Shutdown,
}

/// Returned to the transport on a successful join; the receiver feeds the
/// connection's writer task and the sender routes frames back in.
#[derive(Debug)]
pub struct JoinTicket {
    pub session_id: SessionId,
    pub outbound: mpsc::UnboundedReceiver<ServerMessage>,
    pub lobby_tx: mpsc::UnboundedSender<LobbyCommand>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JoinError {
    #[error("Lobby is full")]
    LobbyFull,
    #[error("Server is full")]
    ServerFull,
    #[error("Lobby is closing")]
    Closing,
}

/// Golden angle used to spread bot patrol anchors around the spawn
const ANCHOR_ANGLE: f32 = 2.399963;

pub struct Lobby {
    pub id: Uuid,
    world: World,
    sessions: HashMap<SessionId, Session>,
    broadcast: BroadcastManager,
    config: SimulationConfig,
    max_humans: usize,
    metrics: Arc<Metrics>,
    store: Arc<dyn PlayerStore>,
    /// Shared with the manager for join routing
    humans: Arc<AtomicUsize>,
    /// Last known region cell per combatant, for entry triggers
    last_cells: HashMap<CombatantId, CellKey>,
    next_cleanup_at: f64,
    bots_issued: usize,
    /// Clone of this lobby's own command sender, handed out in join tickets
    self_tx: mpsc::UnboundedSender<LobbyCommand>,
}

impl Lobby {
    pub fn new(
        config: SimulationConfig,
        max_humans: usize,
        metrics: Arc<Metrics>,
        store: Arc<dyn PlayerStore>,
        humans: Arc<AtomicUsize>,
        self_tx: mpsc::UnboundedSender<LobbyCommand>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            world: World::new(config.world_seed),
            sessions: HashMap::new(),
            broadcast: BroadcastManager::new(),
            config,
            max_humans,
            metrics,
            store,
            humans,
            last_cells: HashMap::new(),
            next_cleanup_at: tick::CLEANUP_INTERVAL,
            bots_issued: 0,
            self_tx,
        }
    }

    /// Drive the lobby until shutdown. One task, one world.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<LobbyCommand>) {
        let mut interval = tokio::time::interval(Duration::from_millis(tick::TICK_DURATION_MS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        self.metrics.lobbies_active.fetch_add(1, Ordering::Relaxed);
        info!(lobby = %self.id, "lobby started");

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick(),
                cmd = rx.recv() => match cmd {
                    Some(LobbyCommand::Join { identity, name, class, reply }) => {
                        let _ = reply.send(self.handle_join(identity, name, class));
                    }
                    Some(LobbyCommand::Message { session, message }) => {
                        self.handle_message(session, message);
                    }
                    Some(LobbyCommand::Disconnect { session }) => {
                        self.handle_disconnect(session);
                    }
                    Some(LobbyCommand::Shutdown) | None => break,
                },
            }
        }

        let remaining: Vec<SessionId> = self.sessions.keys().copied().collect();
        for session_id in remaining {
            self.handle_disconnect(session_id);
        }
        self.metrics.lobbies_active.fetch_sub(1, Ordering::Relaxed);
        info!(lobby = %self.id, "lobby stopped");
    }

    /// One fixed-interval simulation step
    pub fn tick(&mut self) {
        let started = Instant::now();
        self.world.clock += tick::DT as f64;
        self.world.tick += 1;
        let now = self.world.clock;
        let mut events = Vec::new();

        // Deferred actions fire here, each re-checking its target
        for action in self.world.scheduler.drain_due(now) {
            match action {
                ScheduledAction::RespawnCombatant(id) => {
                    combat::respawn_combatant(&mut self.world, &mut events, id)
                }
                ScheduledAction::ExpireMinion(id) => {
                    minions::expire(&mut self.world, &mut events, id, now)
                }
                ScheduledAction::ExpireOrb(id) => {
                    effects::expire_orb(&mut self.world, &mut events, id)
                }
                ScheduledAction::ExpireAreaEffect(id) => {
                    effects::expire_area_effect(&mut self.world, id)
                }
            }
        }

        self.maintain_bots(&mut events);
        self.sweep_presence(now);
        self.trigger_region_entries(&mut events, now);

        bots::step(&mut self.world, &mut events, tick::DT, now);
        let moved = enemies::step(&mut self.world, &mut events, tick::DT, now);
        minions::step(&mut self.world, &mut events, tick::DT, now);
        let pulled = effects::step(&mut self.world, &mut events, tick::DT, now);

        if now >= self.next_cleanup_at {
            population::tick_cleanup(&mut self.world, &mut events, now);
            self.next_cleanup_at = now + tick::CLEANUP_INTERVAL;
        }

        self.kick_idle_sessions();

        self.metrics.count_events(&events);
        let mut sent = self.broadcast.dispatch(&self.world, &self.sessions, events);
        self.broadcast.queue_moves(moved);
        self.broadcast.queue_moves(pulled);
        sent += self.broadcast.flush_moves(&self.world, &self.sessions);

        self.metrics.messages_sent.fetch_add(sent as u64, Ordering::Relaxed);
        self.metrics.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_tick(started.elapsed());
    }

    /// Keep the bot roster in line with human presence: bots stand in for
    /// players and leave when the last human does.
    fn maintain_bots(&mut self, events: &mut Vec<WorldEvent>) {
        let humans = self.world.human_count();
        if humans > 0 {
            while self.world.bot_count() < self.config.target_bots {
                self.spawn_bot(events);
            }
        } else if self.world.bot_count() > 0 {
            let bots: Vec<CombatantId> = self
                .world
                .combatants
                .values()
                .filter(|c| c.is_bot())
                .map(|c| c.id)
                .collect();
            debug!(lobby = %self.id, count = bots.len(), "last human left, removing bots");
            for id in bots {
                self.remove_combatant(id, events);
            }
        }
    }

    fn spawn_bot(&mut self, events: &mut Vec<WorldEvent>) {
        let index = self.bots_issued;
        self.bots_issued += 1;

        let angle = index as f32 * ANCHOR_ANGLE;
        let radius = 400.0 + (index % 4) as f32 * 200.0;
        let anchor = Vec2::from_angle(angle) * radius;
        let class = [
            CombatantClass::Warden,
            CombatantClass::Ranger,
            CombatantClass::Mystic,
        ][index % 3];

        let id = Uuid::new_v4();
        let mut combatant = Combatant::new(
            id,
            format!("Sentinel-{}", index + 1),
            class,
            Controller::Bot(BotState::new(anchor)),
        );
        combatant.position = anchor;
        events.push(WorldEvent::CombatantJoined {
            snapshot: CombatantSnapshot::from_combatant(&combatant),
        });
        self.world.combatants.insert(id, combatant);
    }

    /// Refresh per-region presence from live combatant positions
    fn sweep_presence(&mut self, now: f64) {
        self.world.regions.reset_presence();
        let cells: Vec<CellKey> = self
            .world
            .combatants
            .values()
            .filter(|c| c.alive)
            .map(|c| self.world.regions.cell_for(c.position))
            .collect();
        for cell in cells {
            self.world.regions.mark_present(cell, now);
        }
    }

    /// Fire the population controller for every combatant that crossed a
    /// region boundary since the last look.
    fn trigger_region_entries(&mut self, events: &mut Vec<WorldEvent>, now: f64) {
        let humans = self.world.human_count();
        let crossings: Vec<(CombatantId, CellKey)> = self
            .world
            .combatants
            .values()
            .filter(|c| c.alive)
            .filter_map(|c| {
                let cell = self.world.regions.cell_for(c.position);
                (self.last_cells.get(&c.id) != Some(&cell)).then_some((c.id, cell))
            })
            .collect();

        for (id, cell) in crossings {
            self.last_cells.insert(id, cell);
            population::enter_region(&mut self.world, events, cell, humans, now);
        }
    }

    fn kick_idle_sessions(&mut self) {
        let idle: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.idle_secs() > net_consts::SESSION_IDLE_TIMEOUT)
            .map(|s| s.id)
            .collect();
        for session_id in idle {
            if let Some(session) = self.sessions.get(&session_id) {
                warn!(lobby = %self.id, session = %session_id, "kicking idle session");
                session.send(ServerMessage::Kicked {
                    reason: "idle timeout".to_string(),
                });
            }
            self.handle_disconnect(session_id);
        }
    }

    fn handle_join(
        &mut self,
        identity: Identity,
        name: String,
        class: CombatantClass,
    ) -> Result<JoinTicket, JoinError> {
        if self.sessions.len() >= self.max_humans {
            return Err(JoinError::LobbyFull);
        }

        let combatant_id = Uuid::new_v4();
        let (tx, outbound) = mpsc::unbounded_channel();
        let session = Session::new(identity.user_id, name.clone(), combatant_id, tx);
        let session_id = session.id;

        let mut combatant = Combatant::new(
            combatant_id,
            name,
            class,
            Controller::Human { session: session_id },
        );
        let spawn = self.world.spawn_point();
        combatant.position = spawn;

        // Announce to everyone already here
        let joined = vec![WorldEvent::CombatantJoined {
            snapshot: CombatantSnapshot::from_combatant(&combatant),
        }];
        self.world.combatants.insert(combatant_id, combatant);
        self.broadcast.dispatch(&self.world, &self.sessions, joined);

        // The new arrival may populate its spawn region; existing clients
        // learn of the spawns via events, the newcomer via the snapshot.
        let mut spawn_events = Vec::new();
        let humans = self.world.human_count();
        let cell = self.world.regions.cell_for(spawn);
        let now = self.world.clock;
        population::enter_region(&mut self.world, &mut spawn_events, cell, humans, now);
        self.last_cells.insert(combatant_id, cell);
        self.broadcast.dispatch(&self.world, &self.sessions, spawn_events);

        // Full snapshot only at initial join
        let snapshot = WorldSnapshot::for_viewer(&self.world, spawn);
        session.send(ServerMessage::JoinAccepted {
            combatant_id,
            snapshot,
        });
        info!(lobby = %self.id, session = %session_id, user = %session.user_id, "session joined");
        self.sessions.insert(session_id, session);
        self.humans.store(self.sessions.len(), Ordering::Relaxed);
        self.metrics.sessions_active.fetch_add(1, Ordering::Relaxed);
        self.metrics.sessions_opened_total.fetch_add(1, Ordering::Relaxed);

        Ok(JoinTicket {
            session_id,
            outbound,
            lobby_tx: self.self_tx.clone(),
        })
    }

    /// Handle one client message. Invalid input rejects the single action,
    /// never the session.
    pub fn handle_message(&mut self, session_id: SessionId, message: ClientMessage) {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };
        session.touch();
        let combatant_id = session.combatant;
        let now = self.world.clock;
        let mut events = Vec::new();

        match message {
            ClientMessage::Join { .. } => {
                debug!(session = %session_id, "duplicate join ignored");
            }
            ClientMessage::Move { position } => {
                self.handle_move(combatant_id, position, &mut events, now);
            }
            ClientMessage::Attack { target } => {
                self.handle_attack(combatant_id, target, &mut events, now);
            }
            ClientMessage::CastAbility { ability, at } => {
                self.handle_ability(session_id, combatant_id, ability, at, &mut events, now);
            }
            ClientMessage::SummonMinion { permanent } => {
                minions::try_summon(&mut self.world, &mut events, combatant_id, permanent, now);
            }
            ClientMessage::Ping { timestamp } => {
                let server_timestamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0);
                if let Some(session) = self.sessions.get(&session_id) {
                    session.send(ServerMessage::Pong {
                        client_timestamp: timestamp,
                        server_timestamp,
                    });
                }
            }
            ClientMessage::Leave => {
                self.handle_disconnect(session_id);
            }
        }

        self.metrics.count_events(&events);
        let sent = self.broadcast.dispatch(&self.world, &self.sessions, events);
        self.metrics.messages_sent.fetch_add(sent as u64, Ordering::Relaxed);
    }

    fn handle_move(
        &mut self,
        combatant_id: CombatantId,
        position: Vec2,
        events: &mut Vec<WorldEvent>,
        now: f64,
    ) {
        // Malformed positions reject this action only
        if !position.is_finite()
            || position.x.abs() > bounds::WORLD_HALF_EXTENT
            || position.y.abs() > bounds::WORLD_HALF_EXTENT
        {
            debug!(combatant = %combatant_id, "rejected malformed move");
            return;
        }

        let Some(combatant) = self.world.get_combatant_mut(combatant_id) else {
            return;
        };
        if !combatant.alive {
            return;
        }
        if combatant.position.distance_sq_to(position)
            > bounds::MAX_MOVE_STEP * bounds::MAX_MOVE_STEP
        {
            debug!(combatant = %combatant_id, "rejected oversized move step");
            return;
        }

        combatant.position = position;
        events.push(WorldEvent::CombatantMoved {
            id: combatant_id,
            position,
        });

        // Crossing into a new region may trigger the population controller
        let cell = self.world.regions.cell_for(position);
        if self.last_cells.get(&combatant_id) != Some(&cell) {
            self.last_cells.insert(combatant_id, cell);
            let humans = self.world.human_count();
            population::enter_region(&mut self.world, events, cell, humans, now);
        }
    }

    fn handle_attack(
        &mut self,
        combatant_id: CombatantId,
        target: TargetRef,
        events: &mut Vec<WorldEvent>,
        now: f64,
    ) {
        let (damage, effects_out, range, position) = {
            let Some(combatant) = self.world.get_combatant(combatant_id) else {
                return;
            };
            if !combatant.alive {
                return;
            }
            (
                combatant.damage,
                class_attack_effects(combatant.class),
                combatant.attack_range,
                combatant.position,
            )
        };

        // Range check with a little slack for latency
        if let Some(target_pos) = self.world.position_of(target) {
            if position.distance_sq_to(target_pos) > (range + 40.0) * (range + 40.0) {
                debug!(combatant = %combatant_id, "attack out of range, rejected");
                return;
            }
        }

        combat::apply_damage(
            &mut self.world,
            events,
            DamageSource::Combatant(combatant_id),
            target,
            damage,
            effects_out,
            now,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_ability(
        &mut self,
        session_id: SessionId,
        combatant_id: CombatantId,
        kind: AbilityKind,
        at: Vec2,
        events: &mut Vec<WorldEvent>,
        now: f64,
    ) {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };
        if now < session.next_ability_at {
            return;
        }

        let Some(combatant) = self.world.get_combatant(combatant_id) else {
            return;
        };
        if !combatant.alive || !at.is_finite() {
            return;
        }
        if combatant.position.distance_sq_to(at) > interest::SYNC_RADIUS_SQ {
            debug!(combatant = %combatant_id, "ability target too far, rejected");
            return;
        }

        match kind {
            AbilityKind::Pull => {
                if combatant.class != CombatantClass::Mystic {
                    return;
                }
                session.next_ability_at = now + ability::PULL_COOLDOWN;
                effects::spawn_pull_zone(
                    &mut self.world,
                    events,
                    at,
                    ability::PULL_RADIUS,
                    ability::PULL_STRENGTH,
                    ability::PULL_DURATION,
                    now,
                );
            }
        }
    }

    fn handle_disconnect(&mut self, session_id: SessionId) {
        let Some(session) = self.sessions.remove(&session_id) else {
            return;
        };
        let combatant_id = session.combatant;

        // Persist what the session earned, off the lobby task
        if let Some(combatant) = self.world.get_combatant(combatant_id) {
            let delta = StatsDelta {
                level: combatant.level,
                experience: combatant.experience as u64,
                kills: combatant.kills,
                deaths: combatant.deaths,
            };
            let store = self.store.clone();
            let user_id = session.user_id.clone();
            tokio::task::spawn_blocking(move || store.save_player_stats(&user_id, delta));
        }

        let mut events = Vec::new();
        self.remove_combatant(combatant_id, &mut events);
        self.humans.store(self.sessions.len(), Ordering::Relaxed);
        self.metrics.sessions_active.fetch_sub(1, Ordering::Relaxed);
        self.metrics.sessions_closed_total.fetch_add(1, Ordering::Relaxed);
        info!(lobby = %self.id, session = %session_id, "session left");

        self.broadcast.dispatch(&self.world, &self.sessions, events);
    }

    /// Remove a combatant and every reference the world holds to it:
    /// scheduled timers, minions, aggro entries, enemy targets.
    fn remove_combatant(&mut self, id: CombatantId, events: &mut Vec<WorldEvent>) {
        if self.world.combatants.remove(&id).is_none() {
            return;
        }
        let now = self.world.clock;
        self.world.scheduler.cancel_combatant(id);
        self.last_cells.remove(&id);

        let owned: Vec<MinionId> = self
            .world
            .minions
            .values()
            .filter(|m| m.owner == id)
            .map(|m| m.id)
            .collect();
        for minion_id in owned {
            combat::remove_minion(&mut self.world, events, minion_id, now);
        }

        let gone = TargetRef::Combatant(id);
        for enemy in self.world.enemies.values_mut() {
            enemy.aggro.remove(gone);
            if enemy.target == Some(gone) {
                enemy.target = None;
            }
        }

        events.push(WorldEvent::CombatantLeft { id });
    }

    #[cfg(test)]
    pub fn world(&self) -> &World {
        &self.world
    }

    #[cfg(test)]
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    #[cfg(test)]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub fn test_join(
        &mut self,
        name: &str,
        class: CombatantClass,
    ) -> (SessionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let ticket = self
            .handle_join(
                Identity {
                    user_id: format!("test:{name}"),
                    username: name.to_string(),
                },
                name.to_string(),
                class,
            )
            .expect("join");
        (ticket.session_id, ticket.outbound)
    }
}

/// Per-class on-hit effects for the basic attack
fn class_attack_effects(class: CombatantClass) -> DamageEffects {
    match class {
        CombatantClass::Warden => DamageEffects::knockback(40.0),
        CombatantClass::Ranger => DamageEffects::NONE,
        CombatantClass::Mystic => DamageEffects::bleed(1),
    }
}
