//! Per-enemy aggro tables and target selection
//!
//! Aggro is the priority a combatant or minion has earned on one enemy's
//! target table. Tables are bounded: once full, the lowest-value entry is
//! evicted, keeping memory flat under sustained combat.

use smallvec::SmallVec;

use crate::world::constants::aggro;
use crate::world::state::{Enemy, EnemyRole, TargetRef, World};

/// Bounded map of earned target priority. Values are unsigned, so the
/// non-negativity invariant holds by construction.
#[derive(Debug, Clone, Default)]
pub struct AggroTable {
    entries: SmallVec<[(TargetRef, u32); 8]>,
}

impl AggroTable {
    /// Credit `amount` aggro to a target, evicting the lowest entry if the
    /// table is at capacity and the target is new.
    pub fn add(&mut self, target: TargetRef, amount: u32) {
        if let Some(entry) = self.entries.iter_mut().find(|(t, _)| *t == target) {
            entry.1 = entry.1.saturating_add(amount);
            return;
        }

        if self.entries.len() >= aggro::TABLE_CAP {
            let lowest = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, (_, value))| *value)
                .map(|(idx, _)| idx);
            match lowest {
                // The newcomer only displaces a strictly lower entry
                Some(idx) if self.entries[idx].1 < amount => {
                    self.entries.swap_remove(idx);
                }
                _ => return,
            }
        }

        self.entries.push((target, amount));
    }

    pub fn get(&self, target: TargetRef) -> u32 {
        self.entries
            .iter()
            .find(|(t, _)| *t == target)
            .map(|(_, value)| *value)
            .unwrap_or(0)
    }

    /// Forget a removed participant
    pub fn remove(&mut self, target: TargetRef) {
        self.entries.retain(|(t, _)| *t != target);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A scored targeting candidate
#[derive(Debug, Clone, Copy)]
struct Candidate {
    target: TargetRef,
    score: f32,
    dist_sq: f32,
}

/// Role coefficient: ranged enemies favor players, melee enemies take
/// minion bait.
fn role_coefficient(role: EnemyRole, target: TargetRef) -> f32 {
    match target {
        TargetRef::Combatant(_) if role == EnemyRole::Ranged => aggro::RANGED_PLAYER_COEF,
        TargetRef::Minion(_) if role.is_melee() => aggro::MELEE_MINION_COEF,
        _ => 1.0,
    }
}

fn score_candidate(enemy: &Enemy, target: TargetRef, dist: f32) -> f32 {
    let base = 100.0 / (dist + 1.0) + enemy.aggro.get(target) as f32;
    base * role_coefficient(enemy.role, target)
}

/// Pick this enemy's target for the current tick.
///
/// Candidates are targetable combatants and minions inside sight range.
/// The existing target is retained unless it left sight range, died, or a
/// candidate beats its score by the improvement threshold (prevents
/// target thrashing between near-equal candidates). Ties on score break
/// toward the nearer candidate.
pub fn select_target(enemy: &Enemy, world: &World) -> Option<TargetRef> {
    let sight_sq = enemy.sight_range * enemy.sight_range;
    let mut best: Option<Candidate> = None;

    let mut consider = |target: TargetRef, dist_sq: f32| {
        if dist_sq > sight_sq {
            return;
        }
        let score = score_candidate(enemy, target, dist_sq.sqrt());
        let better = match best {
            None => true,
            Some(current) => {
                score > current.score || (score == current.score && dist_sq < current.dist_sq)
            }
        };
        if better {
            best = Some(Candidate { target, score, dist_sq });
        }
    };

    for combatant in world.combatants.values() {
        if !combatant.is_targetable() {
            continue;
        }
        let dist_sq = enemy.position.distance_sq_to(combatant.position);
        consider(TargetRef::Combatant(combatant.id), dist_sq);
    }

    for minion in world.minions.values() {
        let dist_sq = enemy.position.distance_sq_to(minion.position);
        consider(TargetRef::Minion(minion.id), dist_sq);
    }

    let best = best?;

    // Retention check: a live, in-sight current target survives anything
    // short of a materially better candidate.
    if let Some(current) = enemy.target {
        if current != best.target && world.is_live(current) {
            if let Some(pos) = world.position_of(current) {
                let dist_sq = enemy.position.distance_sq_to(pos);
                let targetable = match current {
                    TargetRef::Combatant(id) => world
                        .get_combatant(id)
                        .map(|c| c.is_targetable())
                        .unwrap_or(false),
                    _ => true,
                };
                if targetable && dist_sq <= sight_sq {
                    let current_score = score_candidate(enemy, current, dist_sq.sqrt());
                    if best.score <= current_score * aggro::IMPROVE_THRESHOLD {
                        return Some(current);
                    }
                }
            }
        }
    }

    Some(best.target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec2::Vec2;
    use crate::world::state::{
        Combatant, CombatantClass, Controller, EnemyRank, Minion,
    };
    use uuid::Uuid;

    fn make_enemy(role: EnemyRole, position: Vec2) -> Enemy {
        Enemy::new(1, role, EnemyRank::Normal, position, (0, 0), 1.0, 1.0)
    }

    fn add_player(world: &mut World, position: Vec2) -> Uuid {
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

    fn add_minion(world: &mut World, id: u64, owner: Uuid, position: Vec2) {
        world.minions.insert(
            id,
            Minion {
                id,
                owner,
                position,
                health: 40,
                target: None,
                permanent: false,
                next_attack_at: 0.0,
                last_update: 0.0,
                expires_at: 60.0,
            },
        );
    }

    #[test]
    fn test_aggro_accumulates() {
        let mut table = AggroTable::default();
        let target = TargetRef::Enemy(9);
        table.add(target, 10);
        table.add(target, 15);
        assert_eq!(table.get(target), 25);
    }

    #[test]
    fn test_aggro_eviction_bound() {
        let mut table = AggroTable::default();
        for i in 0..aggro::TABLE_CAP as u64 {
            table.add(TargetRef::Minion(i), 10 + i as u32);
        }
        assert_eq!(table.len(), aggro::TABLE_CAP);

        // Higher newcomer evicts the lowest entry
        table.add(TargetRef::Minion(999), 1000);
        assert_eq!(table.len(), aggro::TABLE_CAP);
        assert_eq!(table.get(TargetRef::Minion(0)), 0);
        assert_eq!(table.get(TargetRef::Minion(999)), 1000);

        // Lower newcomer is declined
        table.add(TargetRef::Minion(1000), 1);
        assert_eq!(table.get(TargetRef::Minion(1000)), 0);
    }

    #[test]
    fn test_select_nearest_without_aggro() {
        let mut world = World::new(1);
        let near = add_player(&mut world, Vec2::new(50.0, 0.0));
        let _far = add_player(&mut world, Vec2::new(200.0, 0.0));

        let enemy = make_enemy(EnemyRole::Swarmer, Vec2::ZERO);
        assert_eq!(select_target(&enemy, &world), Some(TargetRef::Combatant(near)));
    }

    #[test]
    fn test_prior_aggro_outweighs_distance() {
        let mut world = World::new(1);
        let near = add_player(&mut world, Vec2::new(50.0, 0.0));
        let far = add_player(&mut world, Vec2::new(200.0, 0.0));

        let mut enemy = make_enemy(EnemyRole::Swarmer, Vec2::ZERO);
        enemy.aggro.add(TargetRef::Combatant(far), 500);

        let picked = select_target(&enemy, &world);
        assert_eq!(picked, Some(TargetRef::Combatant(far)));
        assert_ne!(picked, Some(TargetRef::Combatant(near)));
    }

    #[test]
    fn test_out_of_sight_target_dropped_same_tick() {
        let mut world = World::new(1);
        let gone = add_player(&mut world, Vec2::new(5000.0, 0.0));
        let next = add_player(&mut world, Vec2::new(100.0, 0.0));

        let mut enemy = make_enemy(EnemyRole::Swarmer, Vec2::ZERO);
        enemy.target = Some(TargetRef::Combatant(gone));
        enemy.aggro.add(TargetRef::Combatant(gone), 800);

        // Nonzero prior aggro does not save a target outside sight range;
        // the next-highest candidate is acquired in the same selection.
        assert_eq!(select_target(&enemy, &world), Some(TargetRef::Combatant(next)));
    }

    #[test]
    fn test_retention_resists_marginal_improvement() {
        let mut world = World::new(1);
        let current = add_player(&mut world, Vec2::new(110.0, 0.0));
        let slightly_closer = add_player(&mut world, Vec2::new(100.0, 0.0));

        let mut enemy = make_enemy(EnemyRole::Swarmer, Vec2::ZERO);
        enemy.target = Some(TargetRef::Combatant(current));

        // ~10% closer is below the improvement threshold
        let picked = select_target(&enemy, &world);
        assert_eq!(picked, Some(TargetRef::Combatant(current)));
        assert_ne!(picked, Some(TargetRef::Combatant(slightly_closer)));
    }

    #[test]
    fn test_ranged_prefers_player_over_closer_minion() {
        let mut world = World::new(1);
        let owner = add_player(&mut world, Vec2::new(160.0, 0.0));
        add_minion(&mut world, 5, owner, Vec2::new(100.0, 0.0));

        let ranged = make_enemy(EnemyRole::Ranged, Vec2::ZERO);
        assert_eq!(
            select_target(&ranged, &world),
            Some(TargetRef::Combatant(owner))
        );

        // A melee swarmer at the same spot takes the minion bait instead
        let melee = make_enemy(EnemyRole::Swarmer, Vec2::ZERO);
        assert_eq!(select_target(&melee, &world), Some(TargetRef::Minion(5)));
    }

    #[test]
    fn test_spawn_protected_combatant_untargetable() {
        let mut world = World::new(1);
        let id = add_player(&mut world, Vec2::new(50.0, 0.0));
        world.combatants.get_mut(&id).unwrap().spawn_protection = 1.5;

        let enemy = make_enemy(EnemyRole::Swarmer, Vec2::ZERO);
        assert_eq!(select_target(&enemy, &world), None);
    }
}
