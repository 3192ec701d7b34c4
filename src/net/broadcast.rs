//! Interest-filtered event broadcast
//!
//! Every outgoing event is scoped: lobby-global, within the general sync
//! radius of a world position, or within the tighter proximity-effect
//! radius. Relevance checks compare squared distances; no sqrt on the hot
//! path. Per-tick enemy movement is accumulated and flushed as one batched
//! message per recipient instead of one message per entity.

use hashbrown::HashMap;

use crate::net::protocol::{ServerMessage, WorldEvent};
use crate::net::session::{Session, SessionId};
use crate::util::vec2::Vec2;
use crate::world::constants::interest;
use crate::world::state::{EnemyId, World};

/// Delivery scope of one event
enum Scope {
    /// Everyone in the lobby
    Global,
    /// Sessions within the general sync radius of a position
    Near(Vec2),
    /// Sessions within the proximity-effect radius (ability/audio cues)
    Effect(Vec2),
}

fn scope_for(event: &WorldEvent, world: &World) -> Scope {
    match event {
        // Lobby-wide announcements
        WorldEvent::PlayerDied { .. }
        | WorldEvent::PlayerRespawned { .. }
        | WorldEvent::PlayerLeveled { .. }
        | WorldEvent::CombatantJoined { .. }
        | WorldEvent::CombatantLeft { .. } => Scope::Global,

        // Corrections must reach whichever client held the stale mirror;
        // the entity is gone, so there is no position to scope by
        WorldEvent::EnemyDespawned { .. }
        | WorldEvent::MinionDied { .. }
        | WorldEvent::OrbExpired { .. }
        | WorldEvent::OrbCollected { .. }
        | WorldEvent::EnemiesMoved { .. } => Scope::Global,

        WorldEvent::EffectTriggered { position, .. } => Scope::Effect(*position),

        WorldEvent::EnemySpawned { position, .. }
        | WorldEvent::EnemyKilled { position, .. }
        | WorldEvent::CombatantMoved { position, .. }
        | WorldEvent::MinionSpawned { position, .. }
        | WorldEvent::MinionMoved { position, .. }
        | WorldEvent::OrbSpawned { position, .. } => Scope::Near(*position),

        WorldEvent::EnemyDamaged { id, .. } => match world.get_enemy(*id) {
            Some(enemy) => Scope::Near(enemy.position),
            None => Scope::Global,
        },
        WorldEvent::PlayerDamaged { id, .. } => match world.get_combatant(*id) {
            Some(combatant) => Scope::Near(combatant.position),
            None => Scope::Global,
        },
    }
}

/// Fans events out to sessions and batches per-tick movement
pub struct BroadcastManager {
    move_batch: Vec<(EnemyId, Vec2)>,
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastManager {
    pub fn new() -> Self {
        Self {
            move_batch: Vec::with_capacity(256),
        }
    }

    /// Send a message to every session passing the optional relevance
    /// filter `(center, radius_sq)`. Returns the number of deliveries.
    pub fn broadcast(
        &self,
        world: &World,
        sessions: &HashMap<SessionId, Session>,
        msg: &ServerMessage,
        filter: Option<(Vec2, f32)>,
    ) -> usize {
        let mut sent = 0;
        for session in sessions.values() {
            if let Some((center, radius_sq)) = filter {
                let Some(viewer) = world.get_combatant(session.combatant) else {
                    continue;
                };
                if viewer.position.distance_sq_to(center) > radius_sq {
                    continue;
                }
            }
            if session.send(msg.clone()) {
                sent += 1;
            }
        }
        sent
    }

    /// Deliver a batch of world events, each under its own scope
    pub fn dispatch(
        &self,
        world: &World,
        sessions: &HashMap<SessionId, Session>,
        events: Vec<WorldEvent>,
    ) -> usize {
        let mut sent = 0;
        for event in events {
            let filter = match scope_for(&event, world) {
                Scope::Global => None,
                Scope::Near(center) => Some((center, interest::SYNC_RADIUS_SQ)),
                Scope::Effect(center) => Some((center, interest::EFFECT_RADIUS_SQ)),
            };
            sent += self.broadcast(world, sessions, &ServerMessage::Event(event), filter);
        }
        sent
    }

    /// Accumulate enemy movement for this tick's batch
    pub fn queue_moves(&mut self, moved: impl IntoIterator<Item = (EnemyId, Vec2)>) {
        self.move_batch.extend(moved);
    }

    /// Flush the movement batch: each session gets at most one
    /// `EnemiesMoved` message holding only the enemies it can see.
    pub fn flush_moves(
        &mut self,
        world: &World,
        sessions: &HashMap<SessionId, Session>,
    ) -> usize {
        if self.move_batch.is_empty() {
            return 0;
        }

        let mut sent = 0;
        for session in sessions.values() {
            let Some(viewer) = world.get_combatant(session.combatant) else {
                continue;
            };
            let viewer_pos = viewer.position;
            let visible: Vec<(EnemyId, Vec2)> = self
                .move_batch
                .iter()
                .filter(|(_, pos)| pos.distance_sq_to(viewer_pos) <= interest::SYNC_RADIUS_SQ)
                .copied()
                .collect();
            if visible.is_empty() {
                continue;
            }
            if session.send(ServerMessage::Event(WorldEvent::EnemiesMoved { moves: visible })) {
                sent += 1;
            }
        }

        self.move_batch.clear();
        sent
    }
}
