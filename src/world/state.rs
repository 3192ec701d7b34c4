//! World state definitions and structures
//!
//! Contains all simulation entities (enemies, combatants, minions, orbs)
//! and the `World` aggregate that owns them. All id-keyed maps live here,
//! with the lifetime of the owning lobby; nothing is process-global.

use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use crate::util::vec2::Vec2;
use crate::world::aggro::AggroTable;
use crate::world::region::{CellKey, RegionGrid};
use crate::world::scheduler::Scheduler;
use crate::world::systems::bots::BotState;

/// Unique combatant (player or bot) identifier
pub type CombatantId = Uuid;

/// Entity identifier for world-owned entities (enemies, minions, orbs, effects)
pub type EntityId = u64;

pub type EnemyId = EntityId;
pub type MinionId = EntityId;
pub type OrbId = EntityId;
pub type EffectId = EntityId;

/// Anything that can be damaged or targeted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetRef {
    Enemy(EnemyId),
    Combatant(CombatantId),
    Minion(MinionId),
}

/// Origin of a damage event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageSource {
    Combatant(CombatantId),
    Enemy(EnemyId),
    Minion(MinionId),
}

impl DamageSource {
    /// The aggro table key credited for this source's damage.
    /// Enemy-on-enemy damage earns no aggro.
    pub fn as_target_ref(&self) -> Option<TargetRef> {
        match *self {
            DamageSource::Combatant(id) => Some(TargetRef::Combatant(id)),
            DamageSource::Minion(id) => Some(TargetRef::Minion(id)),
            DamageSource::Enemy(_) => None,
        }
    }
}

/// Enemy combat role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EnemyRole {
    Swarmer,
    Striker,
    Tank,
    Ranged,
}

/// Base stats for an enemy role before tier/rank multipliers
#[derive(Debug, Clone, Copy)]
pub struct RoleStats {
    pub health: i32,
    pub damage: i32,
    pub defense: i32,
    pub speed: f32,
    pub sight_range: f32,
    pub attack_range: f32,
    pub attack_cooldown: f64,
}

impl EnemyRole {
    pub fn base_stats(self) -> RoleStats {
        match self {
            EnemyRole::Swarmer => RoleStats {
                health: 20,
                damage: 4,
                defense: 0,
                speed: 150.0,
                sight_range: 420.0,
                attack_range: 40.0,
                attack_cooldown: 0.8,
            },
            EnemyRole::Striker => RoleStats {
                health: 35,
                damage: 10,
                defense: 5,
                speed: 130.0,
                sight_range: 450.0,
                attack_range: 50.0,
                attack_cooldown: 1.2,
            },
            EnemyRole::Tank => RoleStats {
                health: 90,
                damage: 8,
                defense: 25,
                speed: 80.0,
                sight_range: 400.0,
                attack_range: 55.0,
                attack_cooldown: 1.6,
            },
            EnemyRole::Ranged => RoleStats {
                health: 25,
                damage: 7,
                defense: 0,
                speed: 100.0,
                sight_range: 550.0,
                attack_range: 300.0,
                attack_cooldown: 1.4,
            },
        }
    }

    pub fn is_melee(self) -> bool {
        !matches!(self, EnemyRole::Ranged)
    }

    /// Threat contribution to bot target scoring
    pub fn threat_tier(self) -> f32 {
        match self {
            EnemyRole::Swarmer => 1.0,
            EnemyRole::Striker | EnemyRole::Ranged => 2.0,
            EnemyRole::Tank => 3.0,
        }
    }
}

/// Enemy rank within its pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnemyRank {
    Normal,
    Elite,
    Boss,
}

impl EnemyRank {
    pub fn health_mult(self) -> f32 {
        match self {
            EnemyRank::Normal => 1.0,
            EnemyRank::Elite => 2.5,
            EnemyRank::Boss => 8.0,
        }
    }

    pub fn damage_mult(self) -> f32 {
        match self {
            EnemyRank::Normal => 1.0,
            EnemyRank::Elite => 1.5,
            EnemyRank::Boss => 2.5,
        }
    }

    pub fn xp_value(self) -> u32 {
        match self {
            EnemyRank::Normal => 10,
            EnemyRank::Elite => 40,
            EnemyRank::Boss => 200,
        }
    }

    pub fn threat_bonus(self) -> f32 {
        match self {
            EnemyRank::Normal => 0.0,
            EnemyRank::Elite => 1.5,
            EnemyRank::Boss => 4.0,
        }
    }
}

/// Active bleed stacks on a target. Each stack expires on its own timer;
/// damage per bleed tick is `stacks * BLEED_DAMAGE_PER_STACK`, bypassing
/// defense and shields.
#[derive(Debug, Clone, Default)]
pub struct BleedState {
    /// Expiry timestamps, oldest first
    pub stacks: SmallVec<[f64; 5]>,
    /// Next time a bleed tick fires for this target
    pub next_tick_at: f64,
}

impl BleedState {
    pub fn add_stacks(&mut self, count: u32, now: f64, duration: f64, cap: usize) {
        let was_empty = self.stacks.is_empty();
        for _ in 0..count {
            if self.stacks.len() >= cap {
                break;
            }
            self.stacks.push(now + duration);
        }
        if was_empty && !self.stacks.is_empty() {
            // First application starts the tick timer
            self.next_tick_at = now + crate::world::constants::combat::BLEED_TICK_INTERVAL;
        }
    }

    /// Drop stacks whose own duration has elapsed
    pub fn expire(&mut self, now: f64) {
        self.stacks.retain(|&mut expiry| expiry > now);
    }

    pub fn active(&self) -> usize {
        self.stacks.len()
    }
}

/// Non-player combatant
#[derive(Debug, Clone)]
pub struct Enemy {
    pub id: EnemyId,
    pub role: EnemyRole,
    pub rank: EnemyRank,
    pub position: Vec2,
    pub health: i32,
    pub max_health: i32,
    pub damage: i32,
    pub defense: i32,
    pub speed: f32,
    pub sight_range: f32,
    pub attack_range: f32,
    pub attack_cooldown: f64,
    pub aggro: AggroTable,
    pub alive: bool,
    pub stunned_until: f64,
    pub bleed: BleedState,
    pub next_attack_at: f64,
    pub target: Option<TargetRef>,
    /// Region this enemy belongs to; exactly one for its whole lifetime
    pub region: CellKey,
}

impl Enemy {
    pub fn new(
        id: EnemyId,
        role: EnemyRole,
        rank: EnemyRank,
        position: Vec2,
        region: CellKey,
        tier_mult: f32,
        health_mult: f32,
    ) -> Self {
        let base = role.base_stats();
        let health = ((base.health as f32 * tier_mult * rank.health_mult() * health_mult) as i32).max(1);
        let damage = ((base.damage as f32 * tier_mult * rank.damage_mult()) as i32).max(1);
        Self {
            id,
            role,
            rank,
            position,
            health,
            max_health: health,
            damage,
            defense: (base.defense as f32 * tier_mult) as i32,
            speed: base.speed,
            sight_range: base.sight_range,
            attack_range: base.attack_range,
            attack_cooldown: base.attack_cooldown,
            aggro: AggroTable::default(),
            alive: true,
            stunned_until: 0.0,
            bleed: BleedState::default(),
            next_attack_at: 0.0,
            target: None,
            region,
        }
    }

    pub fn is_stunned(&self, now: f64) -> bool {
        now < self.stunned_until
    }

    pub fn threat(&self) -> f32 {
        self.role.threat_tier() + self.rank.threat_bonus()
    }
}

/// Combatant class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatantClass {
    Warden,
    Ranger,
    Mystic,
}

/// Class-derived base stats at level 1
#[derive(Debug, Clone, Copy)]
pub struct ClassStats {
    pub health: i32,
    pub shield: i32,
    pub damage: i32,
    pub defense: i32,
    pub speed: f32,
    pub attack_range: f32,
}

impl CombatantClass {
    pub fn base_stats(self) -> ClassStats {
        match self {
            CombatantClass::Warden => ClassStats {
                health: 140,
                shield: 20,
                damage: 12,
                defense: 15,
                speed: 140.0,
                attack_range: 90.0,
            },
            CombatantClass::Ranger => ClassStats {
                health: 100,
                shield: 10,
                damage: 10,
                defense: 5,
                speed: 160.0,
                attack_range: 360.0,
            },
            CombatantClass::Mystic => ClassStats {
                health: 90,
                shield: 30,
                damage: 9,
                defense: 5,
                speed: 150.0,
                attack_range: 300.0,
            },
        }
    }
}

/// Who drives a combatant
#[derive(Debug, Clone)]
pub enum Controller {
    /// Driven by a connected client session
    Human { session: Uuid },
    /// Driven by the bot controller
    Bot(BotState),
}

/// Player- or bot-controlled combatant. Both variants share the combat
/// resolution path; only the Bot variant gets AI decision dispatch.
#[derive(Debug, Clone)]
pub struct Combatant {
    pub id: CombatantId,
    pub name: String,
    pub class: CombatantClass,
    pub position: Vec2,
    pub health: i32,
    pub max_health: i32,
    pub shield: i32,
    pub level: u32,
    pub experience: u32,
    pub damage: i32,
    pub defense: i32,
    pub speed: f32,
    pub attack_range: f32,
    pub alive: bool,
    /// Remaining untargetability after (re)spawn, seconds
    pub spawn_protection: f32,
    pub stunned_until: f64,
    pub bleed: BleedState,
    pub kills: u32,
    pub deaths: u32,
    pub controller: Controller,
}

impl Combatant {
    pub fn new(id: CombatantId, name: String, class: CombatantClass, controller: Controller) -> Self {
        let stats = class.base_stats();
        Self {
            id,
            name,
            class,
            position: Vec2::ZERO,
            health: stats.health,
            max_health: stats.health,
            shield: stats.shield,
            level: 1,
            experience: 0,
            damage: stats.damage,
            defense: stats.defense,
            speed: stats.speed,
            attack_range: stats.attack_range,
            alive: true,
            spawn_protection: crate::world::constants::combat::SPAWN_PROTECTION,
            stunned_until: 0.0,
            bleed: BleedState::default(),
            kills: 0,
            deaths: 0,
            controller,
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self.controller, Controller::Bot(_))
    }

    pub fn is_human(&self) -> bool {
        matches!(self.controller, Controller::Human { .. })
    }

    /// Alive and past the spawn-protection window
    pub fn is_targetable(&self) -> bool {
        self.alive && self.spawn_protection <= 0.0
    }

    pub fn health_fraction(&self) -> f32 {
        if self.max_health <= 0 {
            return 0.0;
        }
        self.health as f32 / self.max_health as f32
    }

    pub fn bot_state(&self) -> Option<&BotState> {
        match &self.controller {
            Controller::Bot(state) => Some(state),
            Controller::Human { .. } => None,
        }
    }

    pub fn bot_state_mut(&mut self) -> Option<&mut BotState> {
        match &mut self.controller {
            Controller::Bot(state) => Some(state),
            Controller::Human { .. } => None,
        }
    }

    /// Reset level, experience, and class-derived stats to defaults.
    /// Used for the player death penalty; bots respawn without it.
    pub fn reset_progression(&mut self) {
        let stats = self.class.base_stats();
        self.level = 1;
        self.experience = 0;
        self.max_health = stats.health;
        self.health = stats.health;
        self.shield = stats.shield;
        self.damage = stats.damage;
        self.defense = stats.defense;
        self.speed = stats.speed;
        self.attack_range = stats.attack_range;
        self.bleed = BleedState::default();
    }
}

/// Summoned companion
#[derive(Debug, Clone)]
pub struct Minion {
    pub id: MinionId,
    pub owner: CombatantId,
    pub position: Vec2,
    pub health: i32,
    pub target: Option<EnemyId>,
    /// Permanent minions survive owner death and never expire
    pub permanent: bool,
    pub next_attack_at: f64,
    pub last_update: f64,
    pub expires_at: f64,
}

/// Experience orb dropped on enemy death
#[derive(Debug, Clone)]
pub struct Orb {
    pub id: OrbId,
    pub position: Vec2,
    pub xp: u32,
}

/// Transient area effect (pull zone)
#[derive(Debug, Clone)]
pub struct AreaEffect {
    pub id: EffectId,
    pub center: Vec2,
    pub radius: f32,
    /// Units per second enemies are drawn toward the center
    pub strength: f32,
    pub expires_at: f64,
}

/// One game-world instance, owned by exactly one lobby task.
/// Single-threaded mutation only; no locks around any of these maps.
pub struct World {
    pub seed: u64,
    pub clock: f64,
    pub tick: u64,
    pub regions: RegionGrid,
    pub enemies: HashMap<EnemyId, Enemy>,
    pub combatants: HashMap<CombatantId, Combatant>,
    pub minions: HashMap<MinionId, Minion>,
    pub orbs: HashMap<OrbId, Orb>,
    pub area_effects: HashMap<EffectId, AreaEffect>,
    pub scheduler: Scheduler,
    /// World-deterministic RNG for everything not keyed to a region cell
    pub rng: StdRng,
    next_entity_id: EntityId,
}

impl World {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            clock: 0.0,
            tick: 0,
            regions: RegionGrid::default(),
            enemies: HashMap::new(),
            combatants: HashMap::new(),
            minions: HashMap::new(),
            orbs: HashMap::new(),
            area_effects: HashMap::new(),
            scheduler: Scheduler::new(),
            rng: StdRng::seed_from_u64(seed),
            next_entity_id: 1,
        }
    }

    /// Generate a new unique entity ID
    pub fn next_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    /// World spawn point for players
    pub fn spawn_point(&self) -> Vec2 {
        Vec2::ZERO
    }

    pub fn get_enemy(&self, id: EnemyId) -> Option<&Enemy> {
        self.enemies.get(&id)
    }

    pub fn get_enemy_mut(&mut self, id: EnemyId) -> Option<&mut Enemy> {
        self.enemies.get_mut(&id)
    }

    pub fn get_combatant(&self, id: CombatantId) -> Option<&Combatant> {
        self.combatants.get(&id)
    }

    pub fn get_combatant_mut(&mut self, id: CombatantId) -> Option<&mut Combatant> {
        self.combatants.get_mut(&id)
    }

    pub fn live_enemy_count(&self) -> usize {
        self.enemies.values().filter(|e| e.alive).count()
    }

    pub fn human_count(&self) -> usize {
        self.combatants.values().filter(|c| c.is_human()).count()
    }

    pub fn bot_count(&self) -> usize {
        self.combatants.values().filter(|c| c.is_bot()).count()
    }

    /// Count of live minions belonging to an owner
    pub fn minion_count(&self, owner: CombatantId) -> usize {
        self.minions.values().filter(|m| m.owner == owner).count()
    }

    /// Position of a damage/targeting participant, if it still exists
    pub fn position_of(&self, target: TargetRef) -> Option<Vec2> {
        match target {
            TargetRef::Enemy(id) => self.enemies.get(&id).map(|e| e.position),
            TargetRef::Combatant(id) => self.combatants.get(&id).map(|c| c.position),
            TargetRef::Minion(id) => self.minions.get(&id).map(|m| m.position),
        }
    }

    /// Whether a target is still a live participant
    pub fn is_live(&self, target: TargetRef) -> bool {
        match target {
            TargetRef::Enemy(id) => self.enemies.get(&id).map(|e| e.alive).unwrap_or(false),
            TargetRef::Combatant(id) => self.combatants.get(&id).map(|c| c.alive).unwrap_or(false),
            TargetRef::Minion(id) => self.minions.contains_key(&id),
        }
    }
}
