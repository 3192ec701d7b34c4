//! External collaborator seams: authentication and player persistence
//!
//! The simulation consumes these behind traits and never blocks on them.
//! Token verification happens once at join; stat persistence happens at
//! session end, off the lobby task. In-memory implementations ship for
//! development and tests.

use hashbrown::HashMap;
use parking_lot::RwLock;

/// Authenticated identity; opaque to the simulation after join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

/// Persistent per-player aggregates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerStats {
    pub best_level: u32,
    pub total_experience: u64,
    pub kills: u64,
    pub deaths: u64,
}

/// What one session contributed
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsDelta {
    pub level: u32,
    pub experience: u64,
    pub kills: u32,
    pub deaths: u32,
}

/// Token verification, consulted once at join
pub trait TokenVerifier: Send + Sync {
    fn verify_token(&self, token: &str) -> Option<Identity>;
}

/// Player stat persistence, invoked at session end only
pub trait PlayerStore: Send + Sync {
    fn load_player_stats(&self, user_id: &str) -> PlayerStats;
    fn save_player_stats(&self, user_id: &str, delta: StatsDelta);
}

/// Development verifier: any non-empty token is its own identity
pub struct DevTokenVerifier;

impl TokenVerifier for DevTokenVerifier {
    fn verify_token(&self, token: &str) -> Option<Identity> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        Some(Identity {
            user_id: format!("dev:{token}"),
            username: token.to_string(),
        })
    }
}

/// In-memory store for development and tests
#[derive(Default)]
pub struct InMemoryStore {
    stats: RwLock<HashMap<String, PlayerStats>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlayerStore for InMemoryStore {
    fn load_player_stats(&self, user_id: &str) -> PlayerStats {
        self.stats.read().get(user_id).copied().unwrap_or_default()
    }

    fn save_player_stats(&self, user_id: &str, delta: StatsDelta) {
        let mut stats = self.stats.write();
        let entry = stats.entry(user_id.to_string()).or_default();
        entry.best_level = entry.best_level.max(delta.level);
        entry.total_experience += delta.experience;
        entry.kills += delta.kills as u64;
        entry.deaths += delta.deaths as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_verifier_rejects_empty() {
        let verifier = DevTokenVerifier;
        assert!(verifier.verify_token("").is_none());
        assert!(verifier.verify_token("   ").is_none());

        let identity = verifier.verify_token("kai").unwrap();
        assert_eq!(identity.username, "kai");
    }

    #[test]
    fn test_store_accumulates_deltas() {
        let store = InMemoryStore::new();
        assert_eq!(store.load_player_stats("u1"), PlayerStats::default());

        store.save_player_stats(
            "u1",
            StatsDelta {
                level: 4,
                experience: 250,
                kills: 10,
                deaths: 2,
            },
        );
        store.save_player_stats(
            "u1",
            StatsDelta {
                level: 2,
                experience: 100,
                kills: 3,
                deaths: 1,
            },
        );

        let stats = store.load_player_stats("u1");
        assert_eq!(stats.best_level, 4);
        assert_eq!(stats.total_experience, 350);
        assert_eq!(stats.kills, 13);
        assert_eq!(stats.deaths, 3);
    }
}
