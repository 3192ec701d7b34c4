//! Enemy population controller
//!
//! Generates enemy packs per region deterministically from the world seed:
//! the same (seed, cell, pack) triple always yields the same pack. Density
//! escalates through five distance tiers and scales with concurrent human
//! count up to a capped top tier. A global live-enemy cap declines spawns
//! rather than queueing them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::net::protocol::WorldEvent;
use crate::util::vec2::Vec2;
use crate::world::combat::{self, RemovalReason};
use crate::world::constants::{population, region as region_consts, scaling};
use crate::world::region::{CellKey, RegionGrid};
use crate::world::state::{Enemy, EnemyId, EnemyRank, EnemyRole, World};

/// Salt for the region-level roll (pack count) so it never collides with a
/// real pack index
const REGION_ROLL: u32 = u32::MAX;

/// Pure function of (seed, cell, pack): identical inputs always yield the
/// same generator state.
fn pack_rng(seed: u64, cell: CellKey, pack_index: u32) -> StdRng {
    let mut h = seed ^ 0x9e37_79b9_7f4a_7c15;
    for v in [cell.0 as i64 as u64, cell.1 as i64 as u64, pack_index as u64] {
        h ^= v.wrapping_add(0x9e37_79b9_7f4a_7c15);
        h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
        h ^= h >> 27;
    }
    StdRng::seed_from_u64(h)
}

/// Enemy-count multiplier for concurrent human count. Linear per-player
/// bonus, hard-capped at the top scaling tier.
pub fn count_multiplier(humans: usize) -> f32 {
    let n = (humans.max(1) as u32).min(scaling::MAX_SCALING_PLAYERS);
    1.0 + scaling::PER_PLAYER_COUNT_BONUS * (n - 1) as f32
}

/// Enemy-health multiplier for concurrent human count
pub fn health_multiplier(humans: usize) -> f32 {
    let n = (humans.max(1) as u32).min(scaling::MAX_SCALING_PLAYERS);
    1.0 + scaling::PER_PLAYER_HEALTH_BONUS * (n - 1) as f32
}

fn roll_role(rng: &mut StdRng) -> EnemyRole {
    match rng.gen_range(0..100u32) {
        0..=39 => EnemyRole::Swarmer,
        40..=64 => EnemyRole::Striker,
        65..=84 => EnemyRole::Ranged,
        _ => EnemyRole::Tank,
    }
}

/// Handle a combatant entering a region. Spawns the region's population if
/// it is unspawned, off cooldown, and holds no living enemies; otherwise
/// does nothing, so repeated triggers are idempotent.
pub fn enter_region(
    world: &mut World,
    events: &mut Vec<WorldEvent>,
    key: CellKey,
    humans: usize,
    now: f64,
) {
    {
        let region = world.regions.region_mut(key);
        if region.spawned || region.has_living_enemies() || now < region.cooldown_until {
            return;
        }
    }

    let tier = RegionGrid::tier(key);
    let cell_size = world.regions.cell_size();
    let origin = Vec2::new(key.0 as f32 * cell_size, key.1 as f32 * cell_size);

    let (packs_min, packs_max) = population::PACKS_PER_REGION[tier];
    let base_packs = pack_rng(world.seed, key, REGION_ROLL).gen_range(packs_min..=packs_max);
    let packs = ((base_packs as f32) * count_multiplier(humans)).round() as u32;
    let hp_mult = health_multiplier(humans);
    let tier_mult = population::TIER_STAT_MULT[tier];

    let mut spawned = 0usize;
    'packs: for pack_index in 0..packs {
        let mut rng = pack_rng(world.seed, key, pack_index);
        let (size_min, size_max) = population::PACK_SIZE[tier];
        let size = rng.gen_range(size_min..=size_max);
        let role = roll_role(&mut rng);
        let boss_pack = rng.gen_bool(population::BOSS_CHANCE[tier]);
        let center = origin
            + Vec2::new(
                rng.gen_range(0.0..cell_size),
                rng.gen_range(0.0..cell_size),
            );

        for member in 0..size {
            if world.live_enemy_count() >= population::MAX_LIVE_ENEMIES {
                // Load bound: decline the rest, no queueing
                debug!(?key, "global enemy cap reached, spawn declined");
                break 'packs;
            }

            let rank = if boss_pack && member == 0 {
                EnemyRank::Boss
            } else if rng.gen_bool(population::ELITE_CHANCE[tier]) {
                EnemyRank::Elite
            } else {
                EnemyRank::Normal
            };
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let radius = rng.gen_range(0.0..population::PACK_SPREAD);
            let position = center + Vec2::from_angle(angle) * radius;

            let id: EnemyId = world.next_entity_id();
            let enemy = Enemy::new(id, role, rank, position, key, tier_mult, hp_mult);
            events.push(WorldEvent::EnemySpawned {
                id,
                role,
                rank,
                position,
                health: enemy.health,
                max_health: enemy.max_health,
            });
            world.enemies.insert(id, enemy);
            world.regions.region_mut(key).enemies.insert(id);
            spawned += 1;
        }
    }

    if spawned > 0 {
        world.regions.region_mut(key).spawned = true;
        debug!(?key, tier, spawned, humans, "region population generated");
    }
}

/// Periodic inactivity sweep: regions with zero players past the timeout
/// have their enemies silently despawned and go on respawn cooldown.
/// A region with players, or one already cleared, is untouched.
pub fn tick_cleanup(world: &mut World, events: &mut Vec<WorldEvent>, now: f64) {
    let stale: Vec<CellKey> = world
        .regions
        .iter()
        .filter(|r| {
            r.player_count == 0
                && r.has_living_enemies()
                && now - r.last_active > region_consts::INACTIVITY_TIMEOUT
        })
        .map(|r| r.key)
        .collect();

    for key in stale {
        let ids: Vec<EnemyId> = world
            .regions
            .get(key)
            .map(|r| r.enemies.iter().copied().collect())
            .unwrap_or_default();
        debug!(?key, count = ids.len(), "despawning inactive region");
        for id in ids {
            combat::remove_enemy(world, events, id, RemovalReason::Despawn, now);
        }
    }
}
