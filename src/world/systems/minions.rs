//! Minion system: capped summoning, owner-following, auto-attack, lifetime

use rand::Rng;
use tracing::debug;

use crate::net::protocol::WorldEvent;
use crate::util::vec2::Vec2;
use crate::world::combat::{self, DamageEffects};
use crate::world::constants::minion;
use crate::world::scheduler::ScheduledAction;
use crate::world::state::{CombatantId, DamageSource, EnemyId, Minion, MinionId, TargetRef, World};

/// Summon a minion for `owner`. Returns `None` when the per-owner cap is
/// reached or the owner is dead — a declined request, not an error.
pub fn try_summon(
    world: &mut World,
    events: &mut Vec<WorldEvent>,
    owner: CombatantId,
    permanent: bool,
    now: f64,
) -> Option<MinionId> {
    if world.minion_count(owner) >= minion::MAX_PER_OWNER {
        debug!(owner = %owner, "minion cap reached, summon declined");
        return None;
    }
    let owner_pos = {
        let combatant = world.get_combatant(owner)?;
        if !combatant.alive {
            return None;
        }
        combatant.position
    };

    let angle = world.rng.gen_range(0.0..std::f32::consts::TAU);
    let position = owner_pos + Vec2::from_angle(angle) * minion::FOLLOW_OFFSET;
    let id = world.next_entity_id();
    world.minions.insert(
        id,
        Minion {
            id,
            owner,
            position,
            health: minion::HEALTH,
            target: None,
            permanent,
            next_attack_at: 0.0,
            last_update: now,
            expires_at: now + minion::LIFETIME,
        },
    );
    if !permanent {
        world
            .scheduler
            .schedule(now + minion::LIFETIME, ScheduledAction::ExpireMinion(id));
    }
    events.push(WorldEvent::MinionSpawned {
        id,
        owner,
        position,
        permanent,
    });
    Some(id)
}

struct MinionAction {
    id: MinionId,
    position: Option<Vec2>,
    target: Option<EnemyId>,
    attack: Option<EnemyId>,
    next_attack_at: Option<f64>,
}

/// Run one tick for all minions
pub fn step(world: &mut World, events: &mut Vec<WorldEvent>, dt: f32, now: f64) {
    let mut actions = Vec::with_capacity(world.minions.len());

    for m in world.minions.values() {
        let Some(owner) = world.get_combatant(m.owner) else {
            continue;
        };

        let mut action = MinionAction {
            id: m.id,
            position: None,
            target: None,
            attack: None,
            next_attack_at: None,
        };

        let step_len = minion::MOVE_SPEED * dt;
        let nearest = world
            .enemies
            .values()
            .filter(|e| e.alive)
            .map(|e| (e.id, e.position, e.position.distance_sq_to(m.position)))
            .filter(|(_, _, d)| *d <= minion::AGGRO_RANGE * minion::AGGRO_RANGE)
            .min_by(|a, b| a.2.total_cmp(&b.2));

        match nearest {
            Some((enemy_id, enemy_pos, dist_sq)) => {
                action.target = Some(enemy_id);
                let dist = dist_sq.sqrt();
                if dist > minion::ATTACK_RANGE {
                    action.position =
                        Some(m.position + (enemy_pos - m.position).normalize() * step_len);
                } else if now >= m.next_attack_at {
                    action.attack = Some(enemy_id);
                    action.next_attack_at = Some(now + minion::ATTACK_COOLDOWN);
                }
            }
            None => {
                // Nothing to fight: trail the owner at a short offset
                let dist = m.position.distance_to(owner.position);
                if dist > minion::FOLLOW_OFFSET * 1.5 {
                    action.position =
                        Some(m.position + (owner.position - m.position).normalize() * step_len);
                }
            }
        }

        actions.push(action);
    }

    for action in actions {
        if let Some(m) = world.minions.get_mut(&action.id) {
            m.target = action.target;
            m.last_update = now;
            if let Some(at) = action.next_attack_at {
                m.next_attack_at = at;
            }
            if let Some(position) = action.position {
                m.position = position;
                events.push(WorldEvent::MinionMoved {
                    id: action.id,
                    position,
                });
            }
        }

        if let Some(enemy_id) = action.attack {
            combat::apply_damage(
                world,
                events,
                DamageSource::Minion(action.id),
                TargetRef::Enemy(enemy_id),
                minion::DAMAGE,
                DamageEffects::NONE,
                now,
            );
        }
    }
}

/// Scheduled lifetime expiry. The minion may already be gone (owner death,
/// combat), in which case this is a no-op.
pub fn expire(world: &mut World, events: &mut Vec<WorldEvent>, id: MinionId, now: f64) {
    let Some(m) = world.minions.get(&id) else {
        return;
    };
    if m.permanent || now < m.expires_at {
        return;
    }
    combat::remove_minion(world, events, id, now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::constants::tick::DT;
    use crate::world::state::{Combatant, CombatantClass, Controller, Enemy, EnemyRank, EnemyRole};
    use uuid::Uuid;

    fn add_player(world: &mut World, position: Vec2) -> CombatantId {
        let id = Uuid::new_v4();
        let mut c = Combatant::new(
            id,
            "P".to_string(),
            CombatantClass::Mystic,
            Controller::Human { session: Uuid::new_v4() },
        );
        c.position = position;
        c.spawn_protection = 0.0;
        world.combatants.insert(id, c);
        id
    }

    #[test]
    fn test_summon_cap_declines() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let owner = add_player(&mut world, Vec2::ZERO);

        for _ in 0..minion::MAX_PER_OWNER {
            assert!(try_summon(&mut world, &mut events, owner, false, 0.0).is_some());
        }
        // Cap reached: declined, not errored
        assert!(try_summon(&mut world, &mut events, owner, false, 0.0).is_none());
        assert_eq!(world.minion_count(owner), minion::MAX_PER_OWNER);

        // Another owner has their own budget
        let other = add_player(&mut world, Vec2::ZERO);
        assert!(try_summon(&mut world, &mut events, other, false, 0.0).is_some());
    }

    #[test]
    fn test_summon_requires_living_owner() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let owner = add_player(&mut world, Vec2::ZERO);
        world.get_combatant_mut(owner).unwrap().alive = false;

        assert!(try_summon(&mut world, &mut events, owner, false, 0.0).is_none());
    }

    #[test]
    fn test_minion_attacks_nearby_enemy() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let owner = add_player(&mut world, Vec2::ZERO);
        let id = try_summon(&mut world, &mut events, owner, false, 0.0).unwrap();
        // Park the minion on a known spot next to an enemy
        world.minions.get_mut(&id).unwrap().position = Vec2::new(0.0, 0.0);

        let eid = world.next_entity_id();
        let enemy = Enemy::new(
            eid,
            EnemyRole::Swarmer,
            EnemyRank::Normal,
            Vec2::new(150.0, 0.0),
            (0, 0),
            1.0,
            1.0,
        );
        world.regions.region_mut((0, 0)).enemies.insert(eid);
        world.enemies.insert(eid, enemy);

        events.clear();
        step(&mut world, &mut events, DT, 1.0);

        let m = world.minions.get(&id).unwrap();
        assert_eq!(m.target, Some(eid));
        // 150 > attack range: first tick closes in
        assert!(m.position.x > 0.0);

        // Walk until in range, then the attack lands and grants the
        // minion aggro on the enemy's table
        for i in 0..20 {
            step(&mut world, &mut events, DT, 1.0 + i as f64 * DT as f64);
        }
        let aggro = world.get_enemy(eid).unwrap().aggro.get(TargetRef::Minion(id));
        assert!(aggro > 0, "minion earned aggro as tanking bait");
    }

    #[test]
    fn test_expire_is_liveness_checked() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let owner = add_player(&mut world, Vec2::ZERO);
        let id = try_summon(&mut world, &mut events, owner, false, 0.0).unwrap();

        // Firing early is a no-op
        expire(&mut world, &mut events, id, 1.0);
        assert!(world.minions.contains_key(&id));

        // Firing on schedule removes it
        expire(&mut world, &mut events, id, minion::LIFETIME + 1.0);
        assert!(!world.minions.contains_key(&id));

        // Firing against a removed id never panics
        expire(&mut world, &mut events, id, minion::LIFETIME + 2.0);
    }

    #[test]
    fn test_permanent_minion_never_expires() {
        let mut world = World::new(1);
        let mut events = Vec::new();
        let owner = add_player(&mut world, Vec2::ZERO);
        let id = try_summon(&mut world, &mut events, owner, true, 0.0).unwrap();

        // No expiry was scheduled for it
        assert!(world.scheduler.is_empty());
        expire(&mut world, &mut events, id, minion::LIFETIME * 10.0);
        assert!(world.minions.contains_key(&id));
    }
}
