//! Lobby manager: find-or-create routing and per-lobby task handles
//!
//! Each lobby runs as its own tokio task owning its world; the manager
//! only holds command senders and a shared human-count per lobby for
//! routing. Nothing simulation-owned is shared across lobbies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::info;
use uuid::Uuid;

use crate::backend::{Identity, PlayerStore};
use crate::config::{ServerConfig, SimulationConfig};
use crate::lobby::instance::{JoinError, JoinTicket, Lobby, LobbyCommand};
use crate::metrics::Metrics;
use crate::world::state::CombatantClass;

/// Routing handle for one running lobby task
#[derive(Clone)]
pub struct LobbyHandle {
    pub id: Uuid,
    pub tx: mpsc::UnboundedSender<LobbyCommand>,
    /// Updated by the lobby task; read here for join routing
    pub humans: Arc<AtomicUsize>,
}

pub struct LobbyService {
    server_config: ServerConfig,
    sim_config: SimulationConfig,
    metrics: Arc<Metrics>,
    store: Arc<dyn PlayerStore>,
    lobbies: Mutex<Vec<LobbyHandle>>,
}

impl LobbyService {
    pub fn new(
        server_config: ServerConfig,
        sim_config: SimulationConfig,
        metrics: Arc<Metrics>,
        store: Arc<dyn PlayerStore>,
    ) -> Self {
        Self {
            server_config,
            sim_config,
            metrics,
            store,
            lobbies: Mutex::new(Vec::new()),
        }
    }

    /// Route a verified identity into a lobby with room, creating one if
    /// needed.
    pub async fn join(
        &self,
        identity: Identity,
        name: String,
        class: CombatantClass,
    ) -> Result<JoinTicket, JoinError> {
        let handle = self.find_or_create().await?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .tx
            .send(LobbyCommand::Join {
                identity,
                name,
                class,
                reply: reply_tx,
            })
            .map_err(|_| JoinError::Closing)?;
        reply_rx.await.map_err(|_| JoinError::Closing)?
    }

    async fn find_or_create(&self) -> Result<LobbyHandle, JoinError> {
        let mut lobbies = self.lobbies.lock().await;

        // Drop handles whose tasks have exited
        lobbies.retain(|handle| !handle.tx.is_closed());

        if let Some(handle) = lobbies
            .iter()
            .find(|h| h.humans.load(Ordering::Relaxed) < self.server_config.max_players_per_lobby)
        {
            return Ok(handle.clone());
        }

        if lobbies.len() >= self.server_config.max_lobbies {
            return Err(JoinError::ServerFull);
        }

        let humans = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let lobby = Lobby::new(
            self.sim_config.clone(),
            self.server_config.max_players_per_lobby,
            self.metrics.clone(),
            self.store.clone(),
            humans.clone(),
            tx.clone(),
        );
        let id = lobby.id;
        tokio::spawn(lobby.run(rx));
        info!(lobby = %id, total = lobbies.len() + 1, "created lobby");

        let handle = LobbyHandle { id, tx, humans };
        lobbies.push(handle.clone());
        Ok(handle)
    }

    pub async fn lobby_count(&self) -> usize {
        self.lobbies.lock().await.len()
    }

    /// Ask every lobby task to stop
    pub async fn shutdown_all(&self) {
        let lobbies = self.lobbies.lock().await;
        for handle in lobbies.iter() {
            let _ = handle.tx.send(LobbyCommand::Shutdown);
        }
    }
}
