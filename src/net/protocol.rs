//! Wire protocol: client/server messages and the world event contract
//!
//! Events carry the minimal delta a client needs to update its mirror of
//! the world; a full (interest-filtered) snapshot is sent only at join.

use serde::{Deserialize, Serialize};

use crate::util::vec2::Vec2;
use crate::world::state::{
    Combatant, CombatantClass, CombatantId, Enemy, EnemyId, EnemyRank, EnemyRole, Minion,
    MinionId, Orb, OrbId, TargetRef, World,
};

/// Messages from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    /// First message on a connection; anything else is a protocol error
    Join {
        token: String,
        name: String,
        class: CombatantClass,
    },
    /// Position update for the session's combatant
    Move { position: Vec2 },
    /// Basic attack against a target
    Attack { target: TargetRef },
    /// Class ability cast at a world position
    CastAbility { ability: AbilityKind, at: Vec2 },
    /// Request a minion (declined beyond the per-owner cap)
    SummonMinion { permanent: bool },
    /// Leave the world
    Leave,
    /// Ping for latency measurement
    Ping { timestamp: u64 },
}

/// Player-castable abilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbilityKind {
    /// Transient zone that drags enemies toward its center
    Pull,
}

/// Messages from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    JoinAccepted {
        combatant_id: CombatantId,
        snapshot: WorldSnapshot,
    },
    JoinRejected { reason: String },
    /// World state delta
    Event(WorldEvent),
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
    Kicked { reason: String },
}

/// Proximity-scoped effect kinds (ability/audio cues)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    Nova,
    PullZone,
    Heal,
}

/// World state change events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorldEvent {
    EnemySpawned {
        id: EnemyId,
        role: EnemyRole,
        rank: EnemyRank,
        position: Vec2,
        health: i32,
        max_health: i32,
    },
    EnemyDamaged {
        id: EnemyId,
        amount: i32,
        health: i32,
    },
    EnemyKilled {
        id: EnemyId,
        position: Vec2,
        killer: Option<TargetRef>,
        xp: u32,
    },
    /// Silent removal: no loot, no XP. Also sent as the correction for
    /// actions against an enemy id the server no longer knows.
    EnemyDespawned { id: EnemyId },
    /// Per-tick batched movement; one message per recipient per tick
    EnemiesMoved { moves: Vec<(EnemyId, Vec2)> },
    CombatantMoved {
        id: CombatantId,
        position: Vec2,
    },
    PlayerDamaged {
        id: CombatantId,
        amount: i32,
        health: i32,
        shield: i32,
    },
    PlayerDied {
        id: CombatantId,
        position: Vec2,
    },
    PlayerRespawned {
        id: CombatantId,
        position: Vec2,
        health: i32,
        level: u32,
    },
    PlayerLeveled {
        id: CombatantId,
        level: u32,
    },
    /// Another combatant entered the world
    CombatantJoined { snapshot: CombatantSnapshot },
    CombatantLeft { id: CombatantId },
    MinionSpawned {
        id: MinionId,
        owner: CombatantId,
        position: Vec2,
        permanent: bool,
    },
    MinionMoved {
        id: MinionId,
        position: Vec2,
    },
    /// Also sent as the correction for actions against an unknown minion
    MinionDied { id: MinionId },
    OrbSpawned {
        id: OrbId,
        position: Vec2,
        xp: u32,
    },
    OrbCollected {
        id: OrbId,
        by: CombatantId,
        xp: u32,
    },
    /// Uncollected orb timed out
    OrbExpired { id: OrbId },
    /// Ability/audio cue, delivered only near its position
    EffectTriggered {
        kind: EffectKind,
        position: Vec2,
    },
}

/// Full state mirror sent at join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub combatants: Vec<CombatantSnapshot>,
    pub enemies: Vec<EnemySnapshot>,
    pub minions: Vec<MinionSnapshot>,
    pub orbs: Vec<OrbSnapshot>,
}

impl WorldSnapshot {
    /// Build the join snapshot for a viewer position: all combatants, plus
    /// enemies/minions/orbs inside the interest radius.
    pub fn for_viewer(world: &World, viewer: Vec2) -> Self {
        use crate::world::constants::interest::SYNC_RADIUS_SQ;

        Self {
            tick: world.tick,
            combatants: world
                .combatants
                .values()
                .map(CombatantSnapshot::from_combatant)
                .collect(),
            enemies: world
                .enemies
                .values()
                .filter(|e| e.alive && e.position.distance_sq_to(viewer) <= SYNC_RADIUS_SQ)
                .map(EnemySnapshot::from_enemy)
                .collect(),
            minions: world
                .minions
                .values()
                .filter(|m| m.position.distance_sq_to(viewer) <= SYNC_RADIUS_SQ)
                .map(MinionSnapshot::from_minion)
                .collect(),
            orbs: world
                .orbs
                .values()
                .filter(|o| o.position.distance_sq_to(viewer) <= SYNC_RADIUS_SQ)
                .map(OrbSnapshot::from_orb)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatantSnapshot {
    pub id: CombatantId,
    pub name: String,
    pub class: CombatantClass,
    pub position: Vec2,
    pub health: i32,
    pub max_health: i32,
    pub shield: i32,
    pub level: u32,
    pub alive: bool,
    pub is_bot: bool,
}

impl CombatantSnapshot {
    pub fn from_combatant(combatant: &Combatant) -> Self {
        Self {
            id: combatant.id,
            name: combatant.name.clone(),
            class: combatant.class,
            position: combatant.position,
            health: combatant.health,
            max_health: combatant.max_health,
            shield: combatant.shield,
            level: combatant.level,
            alive: combatant.alive,
            is_bot: combatant.is_bot(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnemySnapshot {
    pub id: EnemyId,
    pub role: EnemyRole,
    pub rank: EnemyRank,
    pub position: Vec2,
    pub health: i32,
    pub max_health: i32,
}

impl EnemySnapshot {
    pub fn from_enemy(enemy: &Enemy) -> Self {
        Self {
            id: enemy.id,
            role: enemy.role,
            rank: enemy.rank,
            position: enemy.position,
            health: enemy.health,
            max_health: enemy.max_health,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinionSnapshot {
    pub id: MinionId,
    pub owner: CombatantId,
    pub position: Vec2,
    pub permanent: bool,
}

impl MinionSnapshot {
    pub fn from_minion(minion: &Minion) -> Self {
        Self {
            id: minion.id,
            owner: minion.owner,
            position: minion.position,
            permanent: minion.permanent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbSnapshot {
    pub id: OrbId,
    pub position: Vec2,
    pub xp: u32,
}

impl OrbSnapshot {
    pub fn from_orb(orb: &Orb) -> Self {
        Self {
            id: orb.id,
            position: orb.position,
            xp: orb.xp,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("encode failed: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("decode failed: {0}")]
pub struct DecodeError(String);

pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(msg, bincode::config::standard())
        .map_err(|e| EncodeError(e.to_string()))
}

pub fn decode_server_message(bytes: &[u8]) -> Result<ServerMessage, DecodeError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(msg, bincode::config::standard())
        .map_err(|e| EncodeError(e.to_string()))
}

pub fn decode_client_message(bytes: &[u8]) -> Result<ClientMessage, DecodeError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_roundtrip() {
        let msg = ClientMessage::Move {
            position: Vec2::new(12.5, -3.0),
        };
        let bytes = encode_client_message(&msg).unwrap();
        let decoded = decode_client_message(&bytes).unwrap();
        match decoded {
            ClientMessage::Move { position } => assert_eq!(position, Vec2::new(12.5, -3.0)),
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn test_event_roundtrip() {
        let msg = ServerMessage::Event(WorldEvent::EnemiesMoved {
            moves: vec![(1, Vec2::new(1.0, 2.0)), (2, Vec2::new(3.0, 4.0))],
        });
        let bytes = encode_server_message(&msg).unwrap();
        let decoded = decode_server_message(&bytes).unwrap();
        match decoded {
            ServerMessage::Event(WorldEvent::EnemiesMoved { moves }) => {
                assert_eq!(moves.len(), 2)
            }
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn test_join_snapshot_interest_filtered() {
        use crate::world::state::{EnemyRank, EnemyRole};
        let mut world = World::new(3);
        let near_id = world.next_entity_id();
        let far_id = world.next_entity_id();
        world.enemies.insert(
            near_id,
            Enemy::new(near_id, EnemyRole::Swarmer, EnemyRank::Normal, Vec2::new(100.0, 0.0), (0, 0), 1.0, 1.0),
        );
        world.enemies.insert(
            far_id,
            Enemy::new(far_id, EnemyRole::Swarmer, EnemyRank::Normal, Vec2::new(50_000.0, 0.0), (97, 0), 1.0, 1.0),
        );

        let snapshot = WorldSnapshot::for_viewer(&world, Vec2::ZERO);
        assert_eq!(snapshot.enemies.len(), 1);
        assert_eq!(snapshot.enemies[0].id, near_id);
    }
}
