//! Per-tick enemy step: retarget, move, attack
//!
//! Decisions are computed in a read-only pass, then applied, mirroring the
//! bot controller. Movement is returned to the caller for per-tick
//! batching instead of being emitted per entity.

use crate::net::protocol::WorldEvent;
use crate::util::vec2::Vec2;
use crate::world::aggro;
use crate::world::combat::{self, DamageEffects};
use crate::world::state::{DamageSource, EnemyId, EnemyRole, TargetRef, World};

struct EnemyAction {
    id: EnemyId,
    target: Option<TargetRef>,
    position: Option<Vec2>,
    attack: Option<(TargetRef, i32, DamageEffects)>,
    next_attack_at: Option<f64>,
}

/// Role-specific on-hit effects: tanks slam, strikers open wounds.
fn role_effects(role: EnemyRole) -> DamageEffects {
    match role {
        EnemyRole::Tank => DamageEffects::knockback(50.0),
        EnemyRole::Striker => DamageEffects::bleed(1),
        EnemyRole::Swarmer | EnemyRole::Ranged => DamageEffects::NONE,
    }
}

/// Run one simulation tick for all live enemies. Returns (id, position)
/// for every enemy that moved, for the batched movement broadcast.
pub fn step(
    world: &mut World,
    events: &mut Vec<WorldEvent>,
    dt: f32,
    now: f64,
) -> Vec<(EnemyId, Vec2)> {
    let mut actions = Vec::with_capacity(world.enemies.len());

    for enemy in world.enemies.values() {
        if !enemy.alive {
            continue;
        }
        // Knockback stun suspends both movement and targeting
        if enemy.is_stunned(now) {
            continue;
        }

        let target = aggro::select_target(enemy, world);
        let mut action = EnemyAction {
            id: enemy.id,
            target,
            position: None,
            attack: None,
            next_attack_at: None,
        };

        if let Some((chosen, target_pos)) =
            target.and_then(|t| world.position_of(t).map(|pos| (t, pos)))
        {
            let dist = enemy.position.distance_to(target_pos);
            let step_len = enemy.speed * dt;

            let desired = if enemy.role == EnemyRole::Ranged && dist < enemy.attack_range * 0.5 {
                // Ranged enemies keep their distance
                enemy.position + (enemy.position - target_pos).normalize() * step_len
            } else if dist > enemy.attack_range * 0.8 {
                let toward = (target_pos - enemy.position).normalize() * step_len;
                enemy.position + toward.clamp_length(dist)
            } else {
                enemy.position
            };
            if desired != enemy.position {
                action.position = Some(desired);
            }

            if dist <= enemy.attack_range && now >= enemy.next_attack_at {
                action.attack = Some((chosen, enemy.damage, role_effects(enemy.role)));
                action.next_attack_at = Some(now + enemy.attack_cooldown);
            }
        }

        actions.push(action);
    }

    let mut moved = Vec::new();
    for action in actions {
        if let Some(enemy) = world.get_enemy_mut(action.id) {
            enemy.target = action.target;
            if let Some(position) = action.position {
                enemy.position = position;
                moved.push((action.id, position));
            }
            if let Some(at) = action.next_attack_at {
                enemy.next_attack_at = at;
            }
        }

        if let Some((target, damage, effects)) = action.attack {
            combat::apply_damage(
                world,
                events,
                DamageSource::Enemy(action.id),
                target,
                damage,
                effects,
                now,
            );
        }
    }

    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::constants::tick::DT;
    use crate::world::state::{
        Combatant, CombatantClass, CombatantId, Controller, Enemy, EnemyRank,
    };
    use uuid::Uuid;

    fn add_enemy(world: &mut World, role: EnemyRole, position: Vec2) -> EnemyId {
        let id = world.next_entity_id();
        let enemy = Enemy::new(id, role, EnemyRank::Normal, position, (0, 0), 1.0, 1.0);
        world.regions.region_mut((0, 0)).enemies.insert(id);
        world.regions.region_mut((0, 0)).spawned = true;
        world.enemies.insert(id, enemy);
        id
    }

    fn add_player(world: &mut World, position: Vec2) -> CombatantId {
        let id = Uuid::new_v4();
        let mut c = Combatant::new(
            id,
            "P".to_string(),
            CombatantClass::Warden,
            Controller::Human { session: Uuid::new_v4() },
        );
        c.position = position;
        c.spawn_protection = 0.0;
        world.combatants.insert(id, c);
        id
    }

    #[test]
    fn test_enemy_closes_on_target() {
        let mut world = World::new(1);
        let player = add_player(&mut world, Vec2::new(300.0, 0.0));
        let enemy = add_enemy(&mut world, EnemyRole::Swarmer, Vec2::ZERO);
        let mut events = Vec::new();

        let moved = step(&mut world, &mut events, DT, 0.0);
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].0, enemy);

        let e = world.get_enemy(enemy).unwrap();
        assert!(e.position.x > 0.0, "moved toward the player");
        assert_eq!(e.target, Some(TargetRef::Combatant(player)));
    }

    #[test]
    fn test_enemy_attacks_in_range() {
        let mut world = World::new(1);
        let player = add_player(&mut world, Vec2::new(30.0, 0.0));
        let _enemy = add_enemy(&mut world, EnemyRole::Swarmer, Vec2::ZERO);
        let mut events = Vec::new();

        step(&mut world, &mut events, DT, 0.0);

        assert!(events
            .iter()
            .any(|e| matches!(e, WorldEvent::PlayerDamaged { .. })));
        // Shield soaks before health
        let base = CombatantClass::Warden.base_stats();
        let c = world.get_combatant(player).unwrap();
        assert!(c.shield + c.health < base.shield + base.health);
    }

    #[test]
    fn test_attack_respects_cooldown() {
        let mut world = World::new(1);
        add_player(&mut world, Vec2::new(30.0, 0.0));
        add_enemy(&mut world, EnemyRole::Swarmer, Vec2::ZERO);
        let mut events = Vec::new();

        step(&mut world, &mut events, DT, 0.0);
        let first = events.len();
        assert!(first > 0);

        // Immediately after, cooldown gates the next swing
        step(&mut world, &mut events, DT, 0.01);
        let damage_events = events
            .iter()
            .filter(|e| matches!(e, WorldEvent::PlayerDamaged { .. }))
            .count();
        assert_eq!(damage_events, 1);
    }

    #[test]
    fn test_stunned_enemy_skips_tick() {
        let mut world = World::new(1);
        add_player(&mut world, Vec2::new(30.0, 0.0));
        let enemy = add_enemy(&mut world, EnemyRole::Swarmer, Vec2::ZERO);
        world.get_enemy_mut(enemy).unwrap().stunned_until = 10.0;
        let mut events = Vec::new();

        let moved = step(&mut world, &mut events, DT, 0.0);
        assert!(moved.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn test_ranged_keeps_distance() {
        let mut world = World::new(1);
        add_player(&mut world, Vec2::new(40.0, 0.0));
        let enemy = add_enemy(&mut world, EnemyRole::Ranged, Vec2::ZERO);
        let mut events = Vec::new();

        step(&mut world, &mut events, DT, 0.0);

        let e = world.get_enemy(enemy).unwrap();
        // Backed away from a too-close target
        assert!(e.position.x < 0.0, "backed off, got {:?}", e.position);
    }

    #[test]
    fn test_striker_applies_bleed() {
        let mut world = World::new(1);
        let player = add_player(&mut world, Vec2::new(30.0, 0.0));
        add_enemy(&mut world, EnemyRole::Striker, Vec2::ZERO);
        let mut events = Vec::new();

        step(&mut world, &mut events, DT, 0.0);

        let c = world.get_combatant(player).unwrap();
        assert_eq!(c.bleed.active(), 1);
    }
}
