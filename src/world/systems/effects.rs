//! Timed effects step: bleed ticks, spawn protection, pull zones, orb pickup
//!
//! Bleed stacks live on their targets with per-stack expiry timestamps;
//! the periodic damage here bypasses defense and shields. Everything that
//! fires against an entity re-checks that the entity still exists.

use crate::net::protocol::{EffectKind, WorldEvent};
use crate::util::vec2::Vec2;
use crate::world::combat::{self, award_xp};
use crate::world::constants::{combat as combat_consts, orb};
use crate::world::scheduler::ScheduledAction;
use crate::world::state::{
    AreaEffect, CombatantId, EffectId, EnemyId, OrbId, TargetRef, World,
};

/// Run one effects tick. Returns enemy movement caused by pull zones so
/// the caller can fold it into the batched movement broadcast.
pub fn step(world: &mut World, events: &mut Vec<WorldEvent>, dt: f32, now: f64) -> Vec<(EnemyId, Vec2)> {
    tick_spawn_protection(world, dt);
    tick_bleed(world, events, now);
    let moved = tick_pull_zones(world, dt, now);
    tick_orb_pickup(world, events);
    moved
}

fn tick_spawn_protection(world: &mut World, dt: f32) {
    for combatant in world.combatants.values_mut() {
        if combatant.spawn_protection > 0.0 {
            combatant.spawn_protection = (combatant.spawn_protection - dt).max(0.0);
        }
    }
}

fn tick_bleed(world: &mut World, events: &mut Vec<WorldEvent>, now: f64) {
    // Collect due bleed damage while advancing per-target tick timers,
    // then apply once the borrows are released.
    let mut due: Vec<(TargetRef, i32)> = Vec::new();

    for enemy in world.enemies.values_mut() {
        enemy.bleed.expire(now);
        let stacks = enemy.bleed.active();
        if stacks > 0 && enemy.alive && now >= enemy.bleed.next_tick_at {
            enemy.bleed.next_tick_at = now + combat_consts::BLEED_TICK_INTERVAL;
            due.push((
                TargetRef::Enemy(enemy.id),
                stacks as i32 * combat_consts::BLEED_DAMAGE_PER_STACK,
            ));
        }
    }
    for combatant in world.combatants.values_mut() {
        combatant.bleed.expire(now);
        let stacks = combatant.bleed.active();
        if stacks > 0 && combatant.alive && now >= combatant.bleed.next_tick_at {
            combatant.bleed.next_tick_at = now + combat_consts::BLEED_TICK_INTERVAL;
            due.push((
                TargetRef::Combatant(combatant.id),
                stacks as i32 * combat_consts::BLEED_DAMAGE_PER_STACK,
            ));
        }
    }

    for (target, amount) in due {
        combat::apply_direct_damage(world, events, target, amount, now);
    }
}

fn tick_pull_zones(world: &mut World, dt: f32, now: f64) -> Vec<(EnemyId, Vec2)> {
    let mut moved = Vec::new();
    if world.area_effects.is_empty() {
        return moved;
    }

    let zones: Vec<(Vec2, f32, f32)> = world
        .area_effects
        .values()
        .filter(|z| z.expires_at > now)
        .map(|z| (z.center, z.radius, z.strength))
        .collect();

    for enemy in world.enemies.values_mut() {
        if !enemy.alive {
            continue;
        }
        let mut pulled = false;
        for &(center, radius, strength) in &zones {
            let dist_sq = enemy.position.distance_sq_to(center);
            if dist_sq <= radius * radius && dist_sq > 1.0 {
                let drag = (center - enemy.position).normalize() * (strength * dt);
                enemy.position += drag.clamp_length(dist_sq.sqrt());
                pulled = true;
            }
        }
        if pulled {
            moved.push((enemy.id, enemy.position));
        }
    }
    moved
}

fn tick_orb_pickup(world: &mut World, events: &mut Vec<WorldEvent>) {
    let pickup_sq = orb::PICKUP_RADIUS * orb::PICKUP_RADIUS;

    let mut collected: Vec<(OrbId, CombatantId, u32)> = Vec::new();
    for o in world.orbs.values() {
        let collector = world
            .combatants
            .values()
            .filter(|c| c.alive)
            .find(|c| c.position.distance_sq_to(o.position) <= pickup_sq);
        if let Some(c) = collector {
            collected.push((o.id, c.id, o.xp));
        }
    }

    for (orb_id, by, xp) in collected {
        if world.orbs.remove(&orb_id).is_some() {
            events.push(WorldEvent::OrbCollected { id: orb_id, by, xp });
            award_xp(world, events, by, xp);
        }
    }
}

/// Create a transient pull zone and schedule its expiry
pub fn spawn_pull_zone(
    world: &mut World,
    events: &mut Vec<WorldEvent>,
    center: Vec2,
    radius: f32,
    strength: f32,
    duration: f64,
    now: f64,
) -> EffectId {
    let id = world.next_entity_id();
    world.area_effects.insert(
        id,
        AreaEffect {
            id,
            center,
            radius,
            strength,
            expires_at: now + duration,
        },
    );
    world
        .scheduler
        .schedule(now + duration, ScheduledAction::ExpireAreaEffect(id));
    events.push(WorldEvent::EffectTriggered {
        kind: EffectKind::PullZone,
        position: center,
    });
    id
}

/// Scheduled orb expiry; no-op if it was collected in the meantime
pub fn expire_orb(world: &mut World, events: &mut Vec<WorldEvent>, id: OrbId) {
    if world.orbs.remove(&id).is_some() {
        events.push(WorldEvent::OrbExpired { id });
    }
}

/// Scheduled pull-zone expiry
pub fn expire_area_effect(world: &mut World, id: EffectId) {
    world.area_effects.remove(&id);
}
