//! AI bot controller
//!
//! Bots stand in for players: they patrol around an anchor, engage enemies
//! with focus-fire target selection, retreat with hysteresis when hurt,
//! chase loose orbs, and get recalled by a leash when they stray. Decisions
//! are computed in one read-only pass over the world, then applied
//! sequentially, so the controller never fights the borrow checker mid-tick.

use rand::Rng;

use crate::net::protocol::{EffectKind, WorldEvent};
use crate::util::vec2::Vec2;
use crate::world::combat::{self, DamageEffects};
use crate::world::constants::bot;
use crate::world::state::{CombatantId, DamageSource, Enemy, EnemyId, TargetRef, World};

/// Bot behavior mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotMode {
    /// Fighting a committed target
    Engage,
    /// Disengaged and self-healing until recovered
    Retreat,
    /// Wandering around the patrol anchor
    Patrol,
    /// Collecting a loose experience orb
    OrbSeek,
    /// Leash recall toward the anchor
    Return,
}

/// Per-bot AI state, embedded in the combatant's controller tag
#[derive(Debug, Clone)]
pub struct BotState {
    pub mode: BotMode,
    /// Patrol anchor; also the respawn point
    pub anchor: Vec2,
    pub target: Option<EnemyId>,
    pub wander_goal: Vec2,
    pub next_attack_at: f64,
    pub next_heal_at: f64,
    pub next_nova_at: f64,
    pub next_emergency_heal_at: f64,
    /// Which side of the target this bot strafes on (+1/-1)
    pub strafe_dir: f32,
}

impl BotState {
    pub fn new(anchor: Vec2) -> Self {
        let strafe_dir = if rand::thread_rng().gen_bool(0.5) { 1.0 } else { -1.0 };
        Self {
            mode: BotMode::Patrol,
            anchor,
            target: None,
            wander_goal: anchor,
            next_attack_at: 0.0,
            next_heal_at: 0.0,
            next_nova_at: 0.0,
            next_emergency_heal_at: 0.0,
            strafe_dir,
        }
    }

    pub fn reset_after_respawn(&mut self) {
        self.mode = BotMode::Patrol;
        self.target = None;
        self.wander_goal = self.anchor;
    }
}

/// Hysteresis band for the retreat decision: drop into Retreat below the
/// retreat threshold, leave it only above the higher recovery threshold.
/// No oscillation at either boundary.
pub fn retreat_transition(mode: BotMode, health_fraction: f32) -> BotMode {
    if health_fraction < bot::RETREAT_THRESHOLD {
        BotMode::Retreat
    } else if mode == BotMode::Retreat {
        if health_fraction >= bot::RECOVER_THRESHOLD {
            BotMode::Patrol
        } else {
            BotMode::Retreat
        }
    } else {
        mode
    }
}

/// Weighted engage score: focus fire, finishing low targets, threat tier,
/// and proximity.
pub fn score_enemy(enemy: &Enemy, bot_position: Vec2, allies_on_target: usize) -> f32 {
    let dist = enemy.position.distance_to(bot_position);
    let health_fraction = if enemy.max_health > 0 {
        enemy.health as f32 / enemy.max_health as f32
    } else {
        0.0
    };
    bot::FOCUS_FIRE_WEIGHT * allies_on_target as f32
        + bot::LOW_HEALTH_WEIGHT * (1.0 - health_fraction)
        + bot::THREAT_WEIGHT * enemy.threat()
        + bot::DISTANCE_WEIGHT / (dist + 1.0)
}

struct Decision {
    id: CombatantId,
    mode: BotMode,
    target: Option<EnemyId>,
    position: Vec2,
    moved: bool,
    wander_goal: Vec2,
    attack: Option<EnemyId>,
    nova: bool,
    heal: i32,
    next_attack_at: f64,
    next_heal_at: f64,
    next_nova_at: f64,
    next_emergency_heal_at: f64,
}

/// Run one AI tick for every bot in the world
pub fn step(world: &mut World, events: &mut Vec<WorldEvent>, dt: f32, now: f64) {
    // Focus-fire counts from the targets committed last tick
    let mut allies_on: hashbrown::HashMap<EnemyId, usize> = hashbrown::HashMap::new();
    for combatant in world.combatants.values() {
        if let Some(state) = combatant.bot_state() {
            if combatant.alive {
                if let Some(target) = state.target {
                    *allies_on.entry(target).or_insert(0) += 1;
                }
            }
        }
    }

    let mut decisions = Vec::new();
    for combatant in world.combatants.values() {
        let Some(state) = combatant.bot_state() else {
            continue;
        };
        if !combatant.alive {
            continue;
        }
        decisions.push(decide(world, combatant.id, state, &allies_on, dt, now));
    }

    for decision in decisions {
        apply(world, events, decision, now);
    }
}

fn decide(
    world: &World,
    id: CombatantId,
    state: &BotState,
    allies_on: &hashbrown::HashMap<EnemyId, usize>,
    dt: f32,
    now: f64,
) -> Decision {
    let combatant = &world.combatants[&id];
    let position = combatant.position;
    let health_fraction = combatant.health_fraction();
    let sight_sq = bot::SIGHT_RANGE * bot::SIGHT_RANGE;

    let mut decision = Decision {
        id,
        mode: retreat_transition(state.mode, health_fraction),
        target: state.target,
        position,
        moved: false,
        wander_goal: state.wander_goal,
        attack: None,
        nova: false,
        heal: 0,
        next_attack_at: state.next_attack_at,
        next_heal_at: state.next_heal_at,
        next_nova_at: state.next_nova_at,
        next_emergency_heal_at: state.next_emergency_heal_at,
    };

    let stunned = now < combatant.stunned_until;

    let nearest_enemy = world
        .enemies
        .values()
        .filter(|e| e.alive)
        .map(|e| (e.id, e.position, e.position.distance_sq_to(position)))
        .min_by(|a, b| a.2.total_cmp(&b.2));

    if decision.mode == BotMode::Retreat {
        decision.target = None;
        // Periodic self-heal while disengaged
        if now >= state.next_heal_at {
            decision.heal += bot::RETREAT_HEAL_AMOUNT;
            decision.next_heal_at = now + bot::RETREAT_HEAL_INTERVAL;
        }
        if !stunned {
            let mut dir = (state.anchor - position).normalize();
            if let Some((_, enemy_pos, dist_sq)) = nearest_enemy {
                if dist_sq < sight_sq {
                    dir = (dir + (position - enemy_pos).normalize()).normalize();
                }
            }
            decision.position = position + dir * (combatant.speed * dt);
            decision.moved = true;
        }
    } else {
        // Leash overrides pursuit
        let anchor_dist = position.distance_to(state.anchor);
        if anchor_dist > bot::LEASH_RADIUS {
            decision.mode = BotMode::Return;
            decision.target = None;
        } else if decision.mode == BotMode::Return && anchor_dist < bot::PATROL_RADIUS * 0.5 {
            decision.mode = BotMode::Patrol;
        }

        if decision.mode != BotMode::Return {
            // Keep a viable committed target, otherwise take the top scorer
            let current_viable = decision.target.and_then(|tid| {
                world
                    .enemies
                    .get(&tid)
                    .filter(|e| e.alive && e.position.distance_sq_to(position) <= sight_sq)
                    .map(|_| tid)
            });
            let picked = current_viable.or_else(|| {
                world
                    .enemies
                    .values()
                    .filter(|e| e.alive && e.position.distance_sq_to(position) <= sight_sq)
                    .map(|e| {
                        let allies = allies_on.get(&e.id).copied().unwrap_or(0);
                        (e.id, score_enemy(e, position, allies))
                    })
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(tid, _)| tid)
            });
            decision.target = picked;
            decision.mode = match picked {
                Some(_) => BotMode::Engage,
                None => {
                    // Nothing to fight: sweep up orbs, else keep patrolling
                    let orb_nearby = world
                        .orbs
                        .values()
                        .map(|o| (o.position, o.position.distance_sq_to(position)))
                        .filter(|(_, d)| *d <= sight_sq)
                        .min_by(|a, b| a.1.total_cmp(&b.1));
                    match orb_nearby {
                        Some(_) => BotMode::OrbSeek,
                        None => BotMode::Patrol,
                    }
                }
            };
        }

        if !stunned {
            match decision.mode {
                BotMode::Engage => {
                    if let Some(target) = decision.target.and_then(|tid| world.enemies.get(&tid)) {
                        // Hold a side offset near attack range instead of
                        // standing on top of the target
                        let away = (position - target.position).normalize();
                        let strafe = away.perpendicular() * state.strafe_dir;
                        let hold = target.position
                            + away * (bot::ATTACK_RANGE * 0.8)
                            + strafe * bot::STRAFE_OFFSET;
                        decision.position = step_toward(position, hold, combatant.speed * dt);
                        decision.moved = decision.position != position;

                        let dist = position.distance_to(target.position);
                        if dist <= bot::ATTACK_RANGE && now >= state.next_attack_at {
                            decision.attack = Some(target.id);
                            decision.next_attack_at = now + bot::ATTACK_COOLDOWN;
                        }
                    }
                }
                BotMode::Return => {
                    decision.position =
                        step_toward(position, state.anchor, combatant.speed * dt);
                    decision.moved = true;
                }
                BotMode::Patrol => {
                    if position.distance_to(state.wander_goal) < 20.0 {
                        let mut rng = rand::thread_rng();
                        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
                        let radius = rng.gen_range(0.0..bot::PATROL_RADIUS);
                        decision.wander_goal = state.anchor + Vec2::from_angle(angle) * radius;
                    }
                    decision.position =
                        step_toward(position, decision.wander_goal, combatant.speed * dt * 0.5);
                    decision.moved = decision.position != position;
                }
                BotMode::OrbSeek => {
                    if let Some((orb_pos, _)) = world
                        .orbs
                        .values()
                        .map(|o| (o.position, o.position.distance_sq_to(position)))
                        .min_by(|a, b| a.1.total_cmp(&b.1))
                    {
                        decision.position =
                            step_toward(position, orb_pos, combatant.speed * dt);
                        decision.moved = true;
                    }
                }
                BotMode::Retreat => unreachable!("handled above"),
            }
        }

        // Ability gating: nova wants a crowd, the emergency heal wants
        // critical health. Both are wasted otherwise.
        if now >= state.next_nova_at {
            let nearby = world
                .enemies
                .values()
                .filter(|e| {
                    e.alive
                        && e.position.distance_sq_to(position)
                            <= bot::NOVA_RADIUS * bot::NOVA_RADIUS
                })
                .count();
            if nearby >= bot::NOVA_MIN_ENEMIES {
                decision.nova = true;
                decision.next_nova_at = now + bot::NOVA_COOLDOWN;
            }
        }
        if health_fraction < bot::EMERGENCY_HEAL_THRESHOLD && now >= state.next_emergency_heal_at {
            decision.heal += bot::EMERGENCY_HEAL_AMOUNT;
            decision.next_emergency_heal_at = now + bot::EMERGENCY_HEAL_COOLDOWN;
        }
    }

    decision
}

fn apply(world: &mut World, events: &mut Vec<WorldEvent>, decision: Decision, now: f64) {
    let healed;
    let damage;
    {
        let Some(combatant) = world.get_combatant_mut(decision.id) else {
            return;
        };
        if !combatant.alive {
            return;
        }
        damage = combatant.damage;

        combatant.position = decision.position;
        healed = if decision.heal > 0 {
            let before = combatant.health;
            combatant.health = (combatant.health + decision.heal).min(combatant.max_health);
            combatant.health - before
        } else {
            0
        };

        if let Some(state) = combatant.bot_state_mut() {
            state.mode = decision.mode;
            state.target = decision.target;
            state.wander_goal = decision.wander_goal;
            state.next_attack_at = decision.next_attack_at;
            state.next_heal_at = decision.next_heal_at;
            state.next_nova_at = decision.next_nova_at;
            state.next_emergency_heal_at = decision.next_emergency_heal_at;
        }
    }

    if decision.moved {
        events.push(WorldEvent::CombatantMoved {
            id: decision.id,
            position: decision.position,
        });
    }
    if healed > 0 {
        events.push(WorldEvent::EffectTriggered {
            kind: EffectKind::Heal,
            position: decision.position,
        });
    }

    if let Some(target) = decision.attack {
        combat::apply_damage(
            world,
            events,
            DamageSource::Combatant(decision.id),
            TargetRef::Enemy(target),
            damage,
            DamageEffects::NONE,
            now,
        );
    }

    if decision.nova {
        let victims: Vec<EnemyId> = world
            .enemies
            .values()
            .filter(|e| {
                e.alive
                    && e.position.distance_sq_to(decision.position)
                        <= bot::NOVA_RADIUS * bot::NOVA_RADIUS
            })
            .map(|e| e.id)
            .collect();
        events.push(WorldEvent::EffectTriggered {
            kind: EffectKind::Nova,
            position: decision.position,
        });
        for victim in victims {
            combat::apply_damage(
                world,
                events,
                DamageSource::Combatant(decision.id),
                TargetRef::Enemy(victim),
                bot::NOVA_DAMAGE,
                DamageEffects::NONE,
                now,
            );
        }
    }
}

fn step_toward(from: Vec2, to: Vec2, max_step: f32) -> Vec2 {
    let delta = to - from;
    if delta.length_sq() <= max_step * max_step {
        to
    } else {
        from + delta.normalize() * max_step
    }
}
