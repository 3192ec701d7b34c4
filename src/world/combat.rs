//! Combat resolution engine
//!
//! All damage flows through `apply_damage`: mitigation, shield absorption,
//! instantaneous effects, aggro credit, and the death transition. Death and
//! despawn share one removal path (`remove_enemy`) differing only in
//! whether loot/XP is emitted. Operating on a dead or unknown target is a
//! no-op; client-visible desync is repaired with a correction event.

use tracing::debug;

use crate::net::protocol::WorldEvent;
use crate::util::vec2::Vec2;
use crate::world::constants::{bot, bounds, combat, orb, region};
use crate::world::scheduler::ScheduledAction;
use crate::world::state::{
    CombatantId, Controller, DamageSource, EnemyId, EnemyRank, MinionId, TargetRef, World,
};

/// Instantaneous effects riding on a damage event
#[derive(Debug, Clone, Copy, Default)]
pub struct DamageEffects {
    /// Displacement magnitude along the source→target vector
    pub knockback: Option<f32>,
    /// Bleed stacks to add, up to the stack cap
    pub bleed_stacks: u32,
}

impl DamageEffects {
    pub const NONE: DamageEffects = DamageEffects {
        knockback: None,
        bleed_stacks: 0,
    };

    pub fn knockback(strength: f32) -> Self {
        Self {
            knockback: Some(strength),
            ..Self::NONE
        }
    }

    pub fn bleed(stacks: u32) -> Self {
        Self {
            bleed_stacks: stacks,
            ..Self::NONE
        }
    }
}

/// Result of one damage event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    Applied {
        /// Post-mitigation damage
        mitigated: i32,
        /// Shield + health actually consumed (capped by remaining pools)
        applied: i32,
        killed: bool,
    },
    /// Dead/unknown target or invalid amount
    Ignored,
}

/// Why an enemy is being removed from the world
#[derive(Debug, Clone, Copy)]
pub enum RemovalReason {
    /// Loot-granting removal
    Death { killer: Option<DamageSource> },
    /// Silent removal (region inactivity), no loot
    Despawn,
}

/// Diminishing-returns mitigation. For any raw > 0 the result is at
/// least 1, regardless of defense.
pub fn mitigate(raw: i32, defense: i32) -> i32 {
    let defense = defense.max(0) as i64;
    let mitigated = (raw as i64 * 100) / (100 + defense);
    (mitigated as i32).max(1)
}

/// XP needed to advance from `level` to `level + 1`
pub fn xp_for_next_level(level: u32) -> u32 {
    combat::XP_CURVE * level * level
}

/// Apply one damage event from `source` to `target`.
pub fn apply_damage(
    world: &mut World,
    events: &mut Vec<WorldEvent>,
    source: DamageSource,
    target: TargetRef,
    raw: i32,
    effects: DamageEffects,
    now: f64,
) -> DamageOutcome {
    if raw <= 0 {
        return DamageOutcome::Ignored;
    }

    let source_pos = match source {
        DamageSource::Combatant(id) => world.get_combatant(id).map(|c| c.position),
        DamageSource::Enemy(id) => world.get_enemy(id).map(|e| e.position),
        DamageSource::Minion(id) => world.minions.get(&id).map(|m| m.position),
    };

    match target {
        TargetRef::Enemy(id) => damage_enemy(world, events, source, source_pos, id, raw, effects, now),
        TargetRef::Combatant(id) => {
            damage_combatant(world, events, source_pos, id, raw, effects, now)
        }
        TargetRef::Minion(id) => damage_minion(world, events, id, raw, now),
    }
}

/// Defense- and shield-bypassing damage (bleed ticks). No aggro credit.
pub fn apply_direct_damage(
    world: &mut World,
    events: &mut Vec<WorldEvent>,
    target: TargetRef,
    amount: i32,
    now: f64,
) -> DamageOutcome {
    if amount <= 0 {
        return DamageOutcome::Ignored;
    }

    match target {
        TargetRef::Enemy(id) => {
            let Some(enemy) = world.get_enemy_mut(id) else {
                return DamageOutcome::Ignored;
            };
            if !enemy.alive {
                return DamageOutcome::Ignored;
            }
            let applied = amount.min(enemy.health);
            enemy.health -= applied;
            let health = enemy.health;
            events.push(WorldEvent::EnemyDamaged {
                id,
                amount: applied,
                health,
            });
            let killed = health <= 0;
            if killed {
                remove_enemy(world, events, id, RemovalReason::Death { killer: None }, now);
            }
            DamageOutcome::Applied {
                mitigated: amount,
                applied,
                killed,
            }
        }
        TargetRef::Combatant(id) => {
            let Some(combatant) = world.get_combatant_mut(id) else {
                return DamageOutcome::Ignored;
            };
            if !combatant.alive {
                return DamageOutcome::Ignored;
            }
            let applied = amount.min(combatant.health);
            combatant.health -= applied;
            let health = combatant.health;
            let shield = combatant.shield;
            events.push(WorldEvent::PlayerDamaged {
                id,
                amount: applied,
                health,
                shield,
            });
            let killed = health <= 0;
            if killed {
                kill_combatant(world, events, id, now);
            }
            DamageOutcome::Applied {
                mitigated: amount,
                applied,
                killed,
            }
        }
        TargetRef::Minion(id) => damage_minion(world, events, id, amount, now),
    }
}

#[allow(clippy::too_many_arguments)]
fn damage_enemy(
    world: &mut World,
    events: &mut Vec<WorldEvent>,
    source: DamageSource,
    source_pos: Option<Vec2>,
    id: EnemyId,
    raw: i32,
    effects: DamageEffects,
    now: f64,
) -> DamageOutcome {
    let Some(enemy) = world.get_enemy_mut(id) else {
        // Stale reference: tell the client to drop its mirror of this id
        events.push(WorldEvent::EnemyDespawned { id });
        return DamageOutcome::Ignored;
    };
    if !enemy.alive {
        return DamageOutcome::Ignored;
    }

    let mitigated = mitigate(raw, enemy.defense);
    let applied = mitigated.min(enemy.health);
    enemy.health -= applied;

    if let Some(strength) = effects.knockback {
        if let Some(from) = source_pos {
            let dir = (enemy.position - from).normalize();
            enemy.position = clamp_to_world(enemy.position + dir * strength);
            enemy.stunned_until = enemy.stunned_until.max(now + combat::KNOCKBACK_STUN);
        }
    }
    if effects.bleed_stacks > 0 {
        enemy.bleed.add_stacks(
            effects.bleed_stacks,
            now,
            combat::BLEED_STACK_DURATION,
            combat::BLEED_MAX_STACKS,
        );
    }

    // The source earns priority on this enemy's table
    if let Some(credited) = source.as_target_ref() {
        enemy
            .aggro
            .add(credited, (combat::AGGRO_PER_MITIGATED * mitigated) as u32);
    }

    let health = enemy.health;
    events.push(WorldEvent::EnemyDamaged {
        id,
        amount: applied,
        health,
    });

    let killed = health <= 0;
    if killed {
        remove_enemy(
            world,
            events,
            id,
            RemovalReason::Death { killer: Some(source) },
            now,
        );
    }

    DamageOutcome::Applied {
        mitigated,
        applied,
        killed,
    }
}

fn damage_combatant(
    world: &mut World,
    events: &mut Vec<WorldEvent>,
    source_pos: Option<Vec2>,
    id: CombatantId,
    raw: i32,
    effects: DamageEffects,
    now: f64,
) -> DamageOutcome {
    let Some(combatant) = world.get_combatant_mut(id) else {
        return DamageOutcome::Ignored;
    };
    // Spawn protection is a full invulnerability window
    if !combatant.alive || combatant.spawn_protection > 0.0 {
        return DamageOutcome::Ignored;
    }

    let mitigated = mitigate(raw, combatant.defense);

    // Shield absorbs first; overflow hits health within this same event
    let absorbed = mitigated.min(combatant.shield);
    combatant.shield -= absorbed;
    let overflow = mitigated - absorbed;
    let to_health = overflow.min(combatant.health);
    combatant.health -= to_health;
    let applied = absorbed + to_health;

    if let Some(strength) = effects.knockback {
        if let Some(from) = source_pos {
            let dir = (combatant.position - from).normalize();
            combatant.position = clamp_to_world(combatant.position + dir * strength);
            combatant.stunned_until = combatant.stunned_until.max(now + combat::KNOCKBACK_STUN);
        }
    }
    if effects.bleed_stacks > 0 {
        combatant.bleed.add_stacks(
            effects.bleed_stacks,
            now,
            combat::BLEED_STACK_DURATION,
            combat::BLEED_MAX_STACKS,
        );
    }

    let health = combatant.health;
    let shield = combatant.shield;
    events.push(WorldEvent::PlayerDamaged {
        id,
        amount: applied,
        health,
        shield,
    });

    let killed = health <= 0;
    if killed {
        kill_combatant(world, events, id, now);
    }

    DamageOutcome::Applied {
        mitigated,
        applied,
        killed,
    }
}

fn damage_minion(
    world: &mut World,
    events: &mut Vec<WorldEvent>,
    id: MinionId,
    amount: i32,
    now: f64,
) -> DamageOutcome {
    let Some(minion) = world.minions.get_mut(&id) else {
        // Stale reference correction
        events.push(WorldEvent::MinionDied { id });
        return DamageOutcome::Ignored;
    };

    let applied = amount.min(minion.health);
    minion.health -= applied;
    let killed = minion.health <= 0;
    if killed {
        remove_minion(world, events, id, now);
    }

    DamageOutcome::Applied {
        mitigated: amount,
        applied,
        killed,
    }
}

/// Remove an enemy from the world. Death grants loot/XP; despawn is
/// silent. When the owning region empties, it is cleared and put on
/// respawn cooldown.
pub fn remove_enemy(
    world: &mut World,
    events: &mut Vec<WorldEvent>,
    id: EnemyId,
    reason: RemovalReason,
    now: f64,
) {
    let Some(mut enemy) = world.enemies.remove(&id) else {
        return;
    };
    enemy.alive = false;

    if let Some(owning) = world.regions.get_mut(enemy.region) {
        owning.enemies.remove(&id);
        if owning.enemies.is_empty() {
            owning.clear(now + region::RESPAWN_COOLDOWN);
        }
    }

    match reason {
        RemovalReason::Death { killer } => {
            let xp = enemy.rank.xp_value();
            events.push(WorldEvent::EnemyKilled {
                id,
                position: enemy.position,
                killer: killer.and_then(|source| source.as_target_ref()),
                xp,
            });

            // Kill credit goes to the combatant behind the source
            let credited = match killer {
                Some(DamageSource::Combatant(cid)) => Some(cid),
                Some(DamageSource::Minion(mid)) => world.minions.get(&mid).map(|m| m.owner),
                _ => None,
            };
            if let Some(cid) = credited {
                if let Some(combatant) = world.get_combatant_mut(cid) {
                    combatant.kills += 1;
                }
                award_xp(world, events, cid, xp);
            }

            spawn_orbs(world, events, enemy.position, enemy.rank, now);
        }
        RemovalReason::Despawn => {
            events.push(WorldEvent::EnemyDespawned { id });
        }
    }
}

/// Remove a minion and clear its scheduled expiry
pub fn remove_minion(world: &mut World, events: &mut Vec<WorldEvent>, id: MinionId, _now: f64) {
    if world.minions.remove(&id).is_some() {
        world.scheduler.cancel_minion(id);
        events.push(WorldEvent::MinionDied { id });
    }
}

/// Death transition for a player or bot. Re-entrant calls are no-ops, so
/// at most one death/respawn cycle is ever in flight per combatant.
pub fn kill_combatant(world: &mut World, events: &mut Vec<WorldEvent>, id: CombatantId, now: f64) {
    let Some(combatant) = world.get_combatant_mut(id) else {
        return;
    };
    if !combatant.alive {
        return;
    }

    combatant.alive = false;
    combatant.health = 0;
    combatant.deaths += 1;
    let position = combatant.position;
    let is_bot = combatant.is_bot();
    events.push(WorldEvent::PlayerDied { id, position });

    // Owner death removes companions, permanent ones excepted
    let doomed: Vec<MinionId> = world
        .minions
        .values()
        .filter(|m| m.owner == id && !m.permanent)
        .map(|m| m.id)
        .collect();
    for minion_id in doomed {
        remove_minion(world, events, minion_id, now);
    }

    let delay = if is_bot {
        bot::RESPAWN_DELAY
    } else {
        combat::PLAYER_RESPAWN_DELAY
    };
    world
        .scheduler
        .schedule(now + delay, ScheduledAction::RespawnCombatant(id));
    debug!(combatant = %id, is_bot, "combatant died, respawn in {delay}s");
}

/// Scheduled respawn firing. Liveness-checked: the combatant may have
/// left, or may already be alive if the lobby restarted its cycle.
pub fn respawn_combatant(world: &mut World, events: &mut Vec<WorldEvent>, id: CombatantId) {
    let spawn = world.spawn_point();
    let Some(combatant) = world.get_combatant_mut(id) else {
        return;
    };
    if combatant.alive {
        return;
    }

    let anchor = match &mut combatant.controller {
        Controller::Human { .. } => None,
        Controller::Bot(state) => {
            state.reset_after_respawn();
            Some(state.anchor)
        }
    };
    let position = match anchor {
        // Players pay the death penalty: progression resets to class
        // defaults and they return to the spawn point.
        None => {
            combatant.reset_progression();
            spawn
        }
        // Bots come back at their patrol anchor at full health,
        // progression intact.
        Some(anchor) => {
            combatant.health = combatant.max_health;
            combatant.shield = combatant.class.base_stats().shield;
            combatant.bleed = Default::default();
            anchor
        }
    };

    combatant.position = position;
    combatant.alive = true;
    combatant.spawn_protection = combat::SPAWN_PROTECTION;
    combatant.stunned_until = 0.0;
    let health = combatant.health;
    let level = combatant.level;
    events.push(WorldEvent::PlayerRespawned {
        id,
        position,
        health,
        level,
    });
}

/// Credit XP and resolve level-ups (each level restores full health)
pub fn award_xp(world: &mut World, events: &mut Vec<WorldEvent>, id: CombatantId, xp: u32) {
    let Some(combatant) = world.get_combatant_mut(id) else {
        return;
    };
    if !combatant.alive {
        return;
    }

    combatant.experience += xp;
    let mut leveled = false;
    while combatant.experience >= xp_for_next_level(combatant.level) {
        combatant.experience -= xp_for_next_level(combatant.level);
        combatant.level += 1;
        combatant.max_health += 10;
        combatant.damage += 2;
        combatant.health = combatant.max_health;
        leveled = true;
    }
    if leveled {
        let level = combatant.level;
        events.push(WorldEvent::PlayerLeveled { id, level });
    }
}

fn spawn_orbs(
    world: &mut World,
    events: &mut Vec<WorldEvent>,
    position: Vec2,
    rank: EnemyRank,
    now: f64,
) {
    use rand::Rng;

    let (count, xp_each) = match rank {
        EnemyRank::Normal => (1, 5),
        EnemyRank::Elite => (2, 10),
        EnemyRank::Boss => (5, 20),
    };

    for _ in 0..count {
        let angle = world.rng.gen_range(0.0..std::f32::consts::TAU);
        let radius = world.rng.gen_range(0.0..orb::SCATTER);
        let id = world.next_entity_id();
        let pos = clamp_to_world(position + Vec2::from_angle(angle) * radius);
        world.orbs.insert(
            id,
            crate::world::state::Orb {
                id,
                position: pos,
                xp: xp_each,
            },
        );
        world
            .scheduler
            .schedule(now + orb::LIFETIME, ScheduledAction::ExpireOrb(id));
        events.push(WorldEvent::OrbSpawned {
            id,
            position: pos,
            xp: xp_each,
        });
    }
}

fn clamp_to_world(position: Vec2) -> Vec2 {
    Vec2::new(
        position.x.clamp(-bounds::WORLD_HALF_EXTENT, bounds::WORLD_HALF_EXTENT),
        position.y.clamp(-bounds::WORLD_HALF_EXTENT, bounds::WORLD_HALF_EXTENT),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::state::{
        Combatant, CombatantClass, Enemy, EnemyRole, Controller,
    };
    use uuid::Uuid;

    fn add_enemy(world: &mut World, health: i32, defense: i32) -> EnemyId {
        let id = world.next_entity_id();
        let mut enemy = Enemy::new(
            id,
            EnemyRole::Swarmer,
            EnemyRank::Normal,
            Vec2::new(100.0, 0.0),
            (0, 0),
            1.0,
            1.0,
        );
        enemy.health = health;
        enemy.max_health = health;
        enemy.defense = defense;
        world.regions.region_mut((0, 0)).enemies.insert(id);
        world.regions.region_mut((0, 0)).spawned = true;
        world.enemies.insert(id, enemy);
        id
    }

    fn add_player(world: &mut World) -> CombatantId {
        let id = Uuid::new_v4();
        let mut c = Combatant::new(
            id,
            "P".to_string(),
            CombatantClass::Warden,
            Controller::Human { session: Uuid::new_v4() },
        );
        c.spawn_protection = 0.0;
        world.combatants.insert(id, c);
        id
    }

    #[test]
    fn test_mitigation_floor() {
        // For all raw > 0, mitigated damage is at least 1
        for defense in [0, 10, 100, 1000, 100_000] {
            assert!(mitigate(1, defense) >= 1, "defense {defense}");
            assert!(mitigate(50, defense) >= 1, "defense {defense}");
        }
        assert_eq!(mitigate(100, 0), 100);
        assert_eq!(mitigate(100, 100), 50);
        assert_eq!(mitigate(10, 25), 8);
    }

    #[test]
    fn test_three_hits_kill_exactly_on_third() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let attacker = add_player(&mut world);
        let enemy = add_enemy(&mut world, 30, 0);

        for _ in 0..2 {
            let outcome = apply_damage(
                &mut world,
                &mut events,
                DamageSource::Combatant(attacker),
                TargetRef::Enemy(enemy),
                10,
                DamageEffects::NONE,
                0.0,
            );
            assert!(matches!(outcome, DamageOutcome::Applied { killed: false, .. }));
        }

        let outcome = apply_damage(
            &mut world,
            &mut events,
            DamageSource::Combatant(attacker),
            TargetRef::Enemy(enemy),
            10,
            DamageEffects::NONE,
            0.0,
        );
        assert!(matches!(outcome, DamageOutcome::Applied { killed: true, .. }));

        let kills = events
            .iter()
            .filter(|e| matches!(e, WorldEvent::EnemyKilled { .. }))
            .count();
        assert_eq!(kills, 1);
    }

    #[test]
    fn test_shield_absorbs_then_overflows_same_event() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let id = add_player(&mut world);
        {
            let c = world.get_combatant_mut(id).unwrap();
            c.shield = 20;
            c.health = 50;
            c.defense = 0;
        }

        let outcome = apply_damage(
            &mut world,
            &mut events,
            DamageSource::Enemy(999_999),
            TargetRef::Combatant(id),
            30,
            DamageEffects::NONE,
            0.0,
        );
        assert!(matches!(outcome, DamageOutcome::Applied { applied: 30, .. }));

        let c = world.get_combatant(id).unwrap();
        assert_eq!(c.shield, 0);
        assert_eq!(c.health, 40);
    }

    #[test]
    fn test_conservation_across_single_event() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let id = add_player(&mut world);
        {
            let c = world.get_combatant_mut(id).unwrap();
            c.shield = 15;
            c.health = 80;
            c.defense = 30;
        }

        let before = {
            let c = world.get_combatant(id).unwrap();
            c.shield + c.health
        };

        let outcome = apply_damage(
            &mut world,
            &mut events,
            DamageSource::Enemy(999_999),
            TargetRef::Combatant(id),
            40,
            DamageEffects::NONE,
            0.0,
        );
        let applied = match outcome {
            DamageOutcome::Applied { applied, .. } => applied,
            DamageOutcome::Ignored => panic!("damage was ignored"),
        };

        let after = {
            let c = world.get_combatant(id).unwrap();
            c.shield + c.health
        };
        assert_eq!(before - applied, after);
    }

    #[test]
    fn test_exactly_once_death_under_concurrent_sources() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let a = add_player(&mut world);
        let b = add_player(&mut world);
        let enemy = add_enemy(&mut world, 5, 0);

        // Two sources cross the threshold in the same tick; the second
        // call finds the enemy gone and becomes a no-op + correction.
        let first = apply_damage(
            &mut world,
            &mut events,
            DamageSource::Combatant(a),
            TargetRef::Enemy(enemy),
            50,
            DamageEffects::NONE,
            0.0,
        );
        let second = apply_damage(
            &mut world,
            &mut events,
            DamageSource::Combatant(b),
            TargetRef::Enemy(enemy),
            50,
            DamageEffects::NONE,
            0.0,
        );

        assert!(matches!(first, DamageOutcome::Applied { killed: true, .. }));
        assert_eq!(second, DamageOutcome::Ignored);

        let kills = events
            .iter()
            .filter(|e| matches!(e, WorldEvent::EnemyKilled { .. }))
            .count();
        assert_eq!(kills, 1);
    }

    #[test]
    fn test_unknown_enemy_emits_correction() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let attacker = add_player(&mut world);

        let outcome = apply_damage(
            &mut world,
            &mut events,
            DamageSource::Combatant(attacker),
            TargetRef::Enemy(424_242),
            10,
            DamageEffects::NONE,
            0.0,
        );
        assert_eq!(outcome, DamageOutcome::Ignored);
        assert!(events
            .iter()
            .any(|e| matches!(e, WorldEvent::EnemyDespawned { id: 424_242 })));
    }

    #[test]
    fn test_spawn_protection_blocks_damage() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let id = add_player(&mut world);
        world.get_combatant_mut(id).unwrap().spawn_protection = 1.0;

        let outcome = apply_damage(
            &mut world,
            &mut events,
            DamageSource::Enemy(999_999),
            TargetRef::Combatant(id),
            50,
            DamageEffects::NONE,
            0.0,
        );
        assert_eq!(outcome, DamageOutcome::Ignored);
        let c = world.get_combatant(id).unwrap();
        assert_eq!(c.health, c.max_health);
    }

    #[test]
    fn test_invalid_amount_rejected() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let attacker = add_player(&mut world);
        let enemy = add_enemy(&mut world, 30, 0);

        assert_eq!(
            apply_damage(
                &mut world,
                &mut events,
                DamageSource::Combatant(attacker),
                TargetRef::Enemy(enemy),
                -5,
                DamageEffects::NONE,
                0.0,
            ),
            DamageOutcome::Ignored
        );
        assert_eq!(world.get_enemy(enemy).unwrap().health, 30);
    }

    #[test]
    fn test_enemy_health_never_negative() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let attacker = add_player(&mut world);
        let enemy = add_enemy(&mut world, 10, 0);

        apply_damage(
            &mut world,
            &mut events,
            DamageSource::Combatant(attacker),
            TargetRef::Enemy(enemy),
            10_000,
            DamageEffects::NONE,
            0.0,
        );
        // Dead enemies are removed; the damaged event carried the clamp
        for event in &events {
            if let WorldEvent::EnemyDamaged { health, .. } = event {
                assert!(*health >= 0);
            }
        }
    }

    #[test]
    fn test_damage_grants_aggro_to_source() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let attacker = add_player(&mut world);
        let enemy = add_enemy(&mut world, 100, 0);

        apply_damage(
            &mut world,
            &mut events,
            DamageSource::Combatant(attacker),
            TargetRef::Enemy(enemy),
            10,
            DamageEffects::NONE,
            0.0,
        );

        let aggro = world
            .get_enemy(enemy)
            .unwrap()
            .aggro
            .get(TargetRef::Combatant(attacker));
        assert_eq!(aggro, 20); // 2 x mitigated(10)
    }

    #[test]
    fn test_knockback_displaces_and_stuns() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let attacker = add_player(&mut world); // at origin
        let enemy = add_enemy(&mut world, 100, 0); // at (100, 0)

        apply_damage(
            &mut world,
            &mut events,
            DamageSource::Combatant(attacker),
            TargetRef::Enemy(enemy),
            10,
            DamageEffects::knockback(40.0),
            5.0,
        );

        let e = world.get_enemy(enemy).unwrap();
        assert!(e.position.x > 100.0, "pushed away from the source");
        assert!(e.is_stunned(5.1));
        assert!(!e.is_stunned(5.0 + combat::KNOCKBACK_STUN + 0.01));
    }

    #[test]
    fn test_player_death_resets_progression_on_respawn() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let id = add_player(&mut world);
        {
            let c = world.get_combatant_mut(id).unwrap();
            c.level = 5;
            c.experience = 900;
            c.position = Vec2::new(3000.0, 0.0);
            c.shield = 0;
            c.health = 1;
        }

        apply_damage(
            &mut world,
            &mut events,
            DamageSource::Enemy(1),
            TargetRef::Combatant(id),
            100,
            DamageEffects::NONE,
            10.0,
        );
        assert!(!world.get_combatant(id).unwrap().alive);

        // Second lethal call is a no-op: one cycle in flight
        let again = apply_damage(
            &mut world,
            &mut events,
            DamageSource::Enemy(1),
            TargetRef::Combatant(id),
            100,
            DamageEffects::NONE,
            10.0,
        );
        assert_eq!(again, DamageOutcome::Ignored);
        let scheduled = world.scheduler.len();

        respawn_combatant(&mut world, &mut events, id);
        let c = world.get_combatant(id).unwrap();
        assert!(c.alive);
        assert_eq!(c.level, 1);
        assert_eq!(c.experience, 0);
        assert_eq!(c.position, world.spawn_point());
        assert_eq!(c.health, c.max_health);
        assert!(c.spawn_protection > 0.0);
        assert_eq!(world.scheduler.len(), scheduled);
    }

    #[test]
    fn test_owner_death_removes_minions_permanent_preserved() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let id = add_player(&mut world);

        for (mid, permanent) in [(1u64, false), (2, true)] {
            world.minions.insert(
                mid,
                crate::world::state::Minion {
                    id: mid,
                    owner: id,
                    position: Vec2::ZERO,
                    health: 40,
                    target: None,
                    permanent,
                    next_attack_at: 0.0,
                    last_update: 0.0,
                    expires_at: 60.0,
                },
            );
        }

        kill_combatant(&mut world, &mut events, id, 0.0);

        assert!(!world.minions.contains_key(&1));
        assert!(world.minions.contains_key(&2), "permanent companion survives");
    }

    #[test]
    fn test_kill_awards_xp_and_levels() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let killer = add_player(&mut world);
        {
            let c = world.get_combatant_mut(killer).unwrap();
            c.experience = xp_for_next_level(1) - 5;
        }
        let enemy = add_enemy(&mut world, 1, 0);

        apply_damage(
            &mut world,
            &mut events,
            DamageSource::Combatant(killer),
            TargetRef::Enemy(enemy),
            10,
            DamageEffects::NONE,
            0.0,
        );

        let c = world.get_combatant(killer).unwrap();
        assert_eq!(c.level, 2);
        assert_eq!(c.kills, 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, WorldEvent::PlayerLeveled { level: 2, .. })));
        // Kill dropped at least one orb
        assert!(!world.orbs.is_empty());
    }

    #[test]
    fn test_despawn_is_silent_no_loot() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let enemy = add_enemy(&mut world, 30, 0);

        remove_enemy(&mut world, &mut events, enemy, RemovalReason::Despawn, 0.0);

        assert!(world.orbs.is_empty());
        assert!(events
            .iter()
            .any(|e| matches!(e, WorldEvent::EnemyDespawned { .. })));
        assert!(!events.iter().any(|e| matches!(e, WorldEvent::EnemyKilled { .. })));
    }

    #[test]
    fn test_region_cleared_when_last_enemy_removed() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let enemy = add_enemy(&mut world, 30, 0);
        assert!(world.regions.get((0, 0)).unwrap().spawned);

        remove_enemy(&mut world, &mut events, enemy, RemovalReason::Despawn, 100.0);

        let region = world.regions.get((0, 0)).unwrap();
        assert!(!region.spawned);
        assert!(region.cooldown_until > 100.0);
        assert!(region.enemies.is_empty());
    }
}
