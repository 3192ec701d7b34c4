pub mod bots;
pub mod effects;
pub mod enemies;
pub mod minions;
