/// Simulation tick constants
pub mod tick {
    /// Server tick rate in Hz
    pub const TICK_RATE: u32 = 20;
    /// Delta time per tick in seconds
    pub const DT: f32 = 1.0 / 20.0;
    /// Tick duration in milliseconds
    pub const TICK_DURATION_MS: u64 = 1000 / TICK_RATE as u64;
    /// Seconds between region inactivity sweeps
    pub const CLEANUP_INTERVAL: f64 = 5.0;
}

/// Region partitioning constants
pub mod region {
    /// Side length of one region cell in world units
    pub const CELL_SIZE: f32 = 512.0;
    /// Seconds a region may sit with zero players before its enemies despawn
    pub const INACTIVITY_TIMEOUT: f64 = 60.0;
    /// Cooldown after a region is cleared before it may spawn again
    pub const RESPAWN_COOLDOWN: f64 = 45.0;
    /// Outer edges (in cell-distance from origin) of tiers 1-4; beyond the
    /// last bound is tier 5
    pub const TIER_BOUNDS: [f32; 4] = [4.0, 10.0, 20.0, 35.0];
}

/// Enemy population constants
pub mod population {
    /// Global cap on concurrently live enemies per world
    pub const MAX_LIVE_ENEMIES: usize = 600;
    /// Per-tier pack count range (min, max), tier 1 first
    pub const PACKS_PER_REGION: [(u32, u32); 5] = [(6, 9), (7, 10), (8, 11), (9, 12), (10, 14)];
    /// Per-tier enemies per pack (min, max)
    pub const PACK_SIZE: [(u32, u32); 5] = [(3, 6), (4, 7), (4, 8), (5, 9), (6, 10)];
    /// Per-tier elite probability
    pub const ELITE_CHANCE: [f64; 5] = [0.05, 0.10, 0.18, 0.28, 0.40];
    /// Per-tier boss probability (rolled once per pack)
    pub const BOSS_CHANCE: [f64; 5] = [0.0, 0.02, 0.05, 0.09, 0.15];
    /// Per-tier stat multiplier applied to role base stats
    pub const TIER_STAT_MULT: [f32; 5] = [1.0, 1.35, 1.8, 2.4, 3.2];
    /// Max radius of a pack cluster around its center
    pub const PACK_SPREAD: f32 = 90.0;
}

/// Co-op population scaling. Balancing constants: scaling stops at the
/// 6-player tier and does not continue beyond it.
pub mod scaling {
    /// Extra enemy count per player beyond the first
    pub const PER_PLAYER_COUNT_BONUS: f32 = 0.35;
    /// Extra enemy health per player beyond the first
    pub const PER_PLAYER_HEALTH_BONUS: f32 = 0.2;
    /// Player count at which scaling caps out
    pub const MAX_SCALING_PLAYERS: u32 = 6;
}

/// Combat resolution constants
pub mod combat {
    /// Aggro granted to the source per point of mitigated damage
    pub const AGGRO_PER_MITIGATED: i32 = 2;
    /// Movement/targeting stun applied by knockback, seconds
    pub const KNOCKBACK_STUN: f64 = 0.4;
    /// Seconds of untargetability after (re)spawn
    pub const SPAWN_PROTECTION: f32 = 2.0;
    /// Delay before a dead player respawns
    pub const PLAYER_RESPAWN_DELAY: f64 = 5.0;
    /// Max concurrent bleed stacks on one target
    pub const BLEED_MAX_STACKS: usize = 5;
    /// Lifetime of a single bleed stack, seconds
    pub const BLEED_STACK_DURATION: f64 = 4.0;
    /// Defense-bypassing damage per stack per bleed tick
    pub const BLEED_DAMAGE_PER_STACK: i32 = 2;
    /// Seconds between bleed ticks
    pub const BLEED_TICK_INTERVAL: f64 = 1.0;
    /// XP needed to go from `level` to `level + 1` is `XP_CURVE * level^2`
    pub const XP_CURVE: u32 = 100;
}

/// Enemy targeting constants
pub mod aggro {
    /// Max tracked entries per enemy aggro table; lowest value is evicted
    pub const TABLE_CAP: usize = 16;
    /// A candidate must beat the current target's score by this factor
    pub const IMPROVE_THRESHOLD: f32 = 1.25;
    /// Ranged enemies weight player candidates by this factor
    pub const RANGED_PLAYER_COEF: f32 = 2.0;
    /// Melee enemies weight minion candidates by this factor (tanking bait)
    pub const MELEE_MINION_COEF: f32 = 1.5;
}

/// AI bot constants
pub mod bot {
    /// Bots maintained while the lobby has at least one human
    pub const TARGET_COUNT: usize = 4;
    /// Health fraction below which a bot retreats
    pub const RETREAT_THRESHOLD: f32 = 0.4;
    /// Health fraction a retreating bot must recover to before re-engaging
    pub const RECOVER_THRESHOLD: f32 = 0.6;
    /// Max distance from the patrol anchor before the leash recalls the bot
    pub const LEASH_RADIUS: f32 = 900.0;
    /// Radius of the patrol wander area around the anchor
    pub const PATROL_RADIUS: f32 = 350.0;
    /// How far a bot can see enemies and orbs
    pub const SIGHT_RANGE: f32 = 700.0;
    /// Side offset held from the current target while engaging
    pub const STRAFE_OFFSET: f32 = 48.0;
    /// Basic attack range
    pub const ATTACK_RANGE: f32 = 120.0;
    /// Seconds between basic attacks
    pub const ATTACK_COOLDOWN: f64 = 0.9;
    /// Delay before a dead bot respawns at its anchor
    pub const RESPAWN_DELAY: f64 = 8.0;
    /// Self-heal interval while retreating
    pub const RETREAT_HEAL_INTERVAL: f64 = 1.0;
    /// Health restored per retreat heal
    pub const RETREAT_HEAL_AMOUNT: i32 = 8;
    /// Nova ability: cooldown, radius, damage, minimum nearby enemies
    pub const NOVA_COOLDOWN: f64 = 10.0;
    pub const NOVA_RADIUS: f32 = 220.0;
    pub const NOVA_DAMAGE: i32 = 18;
    pub const NOVA_MIN_ENEMIES: usize = 3;
    /// Emergency heal: cooldown, health fraction gate, amount
    pub const EMERGENCY_HEAL_COOLDOWN: f64 = 20.0;
    pub const EMERGENCY_HEAL_THRESHOLD: f32 = 0.2;
    pub const EMERGENCY_HEAL_AMOUNT: i32 = 40;

    /// Target scoring weights
    pub const FOCUS_FIRE_WEIGHT: f32 = 25.0;
    pub const LOW_HEALTH_WEIGHT: f32 = 40.0;
    pub const THREAT_WEIGHT: f32 = 15.0;
    pub const DISTANCE_WEIGHT: f32 = 100.0;
}

/// Player ability constants
pub mod ability {
    /// Pull zone: cooldown, radius, pull speed, lifetime
    pub const PULL_COOLDOWN: f64 = 8.0;
    pub const PULL_RADIUS: f32 = 180.0;
    pub const PULL_STRENGTH: f32 = 120.0;
    pub const PULL_DURATION: f64 = 3.0;
}

/// Minion constants
pub mod minion {
    /// Max concurrently live minions per owner
    pub const MAX_PER_OWNER: usize = 3;
    /// Lifetime of a non-permanent minion, seconds
    pub const LIFETIME: f64 = 60.0;
    /// Distance held behind the owner while following
    pub const FOLLOW_OFFSET: f32 = 60.0;
    /// Range within which a minion picks up and attacks enemies
    pub const ATTACK_RANGE: f32 = 80.0;
    pub const AGGRO_RANGE: f32 = 320.0;
    pub const ATTACK_COOLDOWN: f64 = 1.2;
    pub const DAMAGE: i32 = 6;
    pub const MOVE_SPEED: f32 = 170.0;
    pub const HEALTH: i32 = 40;
}

/// Loot orb constants
pub mod orb {
    /// Pickup radius around a combatant
    pub const PICKUP_RADIUS: f32 = 40.0;
    /// Seconds before an uncollected orb expires
    pub const LIFETIME: f64 = 90.0;
    /// Scatter radius around the dead enemy
    pub const SCATTER: f32 = 35.0;
}

/// Interest management radii
pub mod interest {
    /// General state sync radius
    pub const SYNC_RADIUS: f32 = 1400.0;
    pub const SYNC_RADIUS_SQ: f32 = SYNC_RADIUS * SYNC_RADIUS;
    /// Tighter radius for proximity ability/audio effects
    pub const EFFECT_RADIUS: f32 = 600.0;
    pub const EFFECT_RADIUS_SQ: f32 = EFFECT_RADIUS * EFFECT_RADIUS;
}

/// World bounds and movement validation
pub mod bounds {
    /// Half-extent of the playable square, world units
    pub const WORLD_HALF_EXTENT: f32 = 100_000.0;
    /// Largest accepted position change in a single move message
    pub const MAX_MOVE_STEP: f32 = 300.0;
}

/// Networking constants
pub mod net {
    /// Maximum framed message size in bytes
    pub const MAX_MESSAGE_SIZE: usize = 65536;
    /// Seconds of silence before a session is considered idle
    pub const SESSION_IDLE_TIMEOUT: f64 = 120.0;
}
