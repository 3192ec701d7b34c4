//! Connected client sessions
//!
//! A session links an authenticated identity to its combatant and carries
//! the outbound message channel the connection's writer task drains.
//! Delivery is reliable and ordered per connection; there is no ordering
//! guarantee across connections.

use std::time::Instant;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::net::protocol::ServerMessage;
use crate::world::state::CombatantId;

pub type SessionId = Uuid;

/// One connected client in a lobby
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    /// Opaque identity from the token verifier
    pub user_id: String,
    pub name: String,
    pub combatant: CombatantId,
    pub connected_at: Instant,
    pub last_seen: Instant,
    /// Per-session ability cooldown gate (sim time)
    pub next_ability_at: f64,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Session {
    pub fn new(
        user_id: String,
        name: String,
        combatant: CombatantId,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name,
            combatant,
            connected_at: now,
            last_seen: now,
            next_ability_at: 0.0,
            tx,
        }
    }

    /// Queue a message for the connection's writer task. Returns false if
    /// the connection is gone; the disconnect path cleans the session up.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.tx.send(msg).is_ok()
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn idle_secs(&self) -> f64 {
        self.last_seen.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_after_receiver_drop_reports_dead() {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new("u1".to_string(), "Kai".to_string(), Uuid::new_v4(), tx);
        assert!(session.send(ServerMessage::Kicked {
            reason: "test".to_string()
        }));

        drop(rx);
        assert!(!session.send(ServerMessage::Kicked {
            reason: "test".to_string()
        }));
    }

    #[test]
    fn test_touch_refreshes_idle_clock() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = Session::new("u1".to_string(), "Kai".to_string(), Uuid::new_v4(), tx);
        session.last_seen = Instant::now() - std::time::Duration::from_secs(30);
        assert!(session.idle_secs() >= 30.0);
        session.touch();
        assert!(session.idle_secs() < 1.0);
    }
}
