//! Prometheus-compatible metrics endpoint
//!
//! The registry is the only state shared across lobbies: append-only
//! counters, a couple of active-count gauges, and a tick-time histogram.
//! Exposed as Prometheus text and JSON on a small tokio listener.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::net::protocol::WorldEvent;

/// Size of the rolling tick-time window
const TICK_WINDOW: usize = 512;

/// Metrics registry for the world server
#[derive(Debug)]
pub struct Metrics {
    // Active counts
    pub lobbies_active: AtomicU64,
    pub sessions_active: AtomicU64,

    // Append-only totals
    pub sessions_opened_total: AtomicU64,
    pub sessions_closed_total: AtomicU64,
    pub connections_total: AtomicU64,
    pub ticks_total: AtomicU64,
    pub messages_sent: AtomicU64,
    pub enemies_spawned_total: AtomicU64,
    pub enemies_killed_total: AtomicU64,
    pub enemies_despawned_total: AtomicU64,
    pub player_deaths_total: AtomicU64,
    pub minions_spawned_total: AtomicU64,
    pub orbs_collected_total: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,

    tick_window: RwLock<VecDeque<u64>>,
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            lobbies_active: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            sessions_opened_total: AtomicU64::new(0),
            sessions_closed_total: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            ticks_total: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            enemies_spawned_total: AtomicU64::new(0),
            enemies_killed_total: AtomicU64::new(0),
            enemies_despawned_total: AtomicU64::new(0),
            player_deaths_total: AtomicU64::new(0),
            minions_spawned_total: AtomicU64::new(0),
            orbs_collected_total: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_window: RwLock::new(VecDeque::with_capacity(TICK_WINDOW)),
            start_time: Instant::now(),
        }
    }

    /// Fold a tick's event batch into the totals
    pub fn count_events(&self, events: &[WorldEvent]) {
        for event in events {
            let counter = match event {
                WorldEvent::EnemySpawned { .. } => &self.enemies_spawned_total,
                WorldEvent::EnemyKilled { .. } => &self.enemies_killed_total,
                WorldEvent::EnemyDespawned { .. } => &self.enemies_despawned_total,
                WorldEvent::PlayerDied { .. } => &self.player_deaths_total,
                WorldEvent::MinionSpawned { .. } => &self.minions_spawned_total,
                WorldEvent::OrbCollected { .. } => &self.orbs_collected_total,
                _ => continue,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one tick's wall time
    pub fn record_tick(&self, elapsed: Duration) {
        let us = elapsed.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_time_max_us.fetch_max(us, Ordering::Relaxed);

        let mut window = self.tick_window.write();
        if window.len() >= TICK_WINDOW {
            window.pop_front();
        }
        window.push_back(us);
    }

    /// p95 over the rolling tick window
    pub fn tick_time_p95_us(&self) -> u64 {
        let window = self.tick_window.read();
        if window.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = window.iter().copied().collect();
        sorted.sort_unstable();
        let idx = (sorted.len() as f64 * 0.95) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Render in Prometheus text exposition format
    pub fn to_prometheus(&self) -> String {
        let mut out = String::with_capacity(2048);
        let mut gauge = |name: &str, help: &str, value: u64| {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}\n"
            ));
        };

        gauge("frontier_uptime_seconds", "Server uptime", self.uptime_secs());
        gauge(
            "frontier_lobbies_active",
            "Running lobby tasks",
            self.lobbies_active.load(Ordering::Relaxed),
        );
        gauge(
            "frontier_sessions_active",
            "Connected sessions",
            self.sessions_active.load(Ordering::Relaxed),
        );
        gauge(
            "frontier_tick_time_us",
            "Last tick wall time (us)",
            self.tick_time_us.load(Ordering::Relaxed),
        );
        gauge(
            "frontier_tick_time_p95_us",
            "p95 tick wall time (us)",
            self.tick_time_p95_us(),
        );
        gauge(
            "frontier_tick_time_max_us",
            "Max tick wall time (us)",
            self.tick_time_max_us.load(Ordering::Relaxed),
        );

        let counters: [(&str, &str, &AtomicU64); 10] = [
            ("frontier_sessions_opened_total", "Sessions opened", &self.sessions_opened_total),
            ("frontier_sessions_closed_total", "Sessions closed", &self.sessions_closed_total),
            ("frontier_connections_total", "TCP connections accepted", &self.connections_total),
            ("frontier_ticks_total", "Simulation ticks", &self.ticks_total),
            ("frontier_messages_sent_total", "Messages delivered", &self.messages_sent),
            ("frontier_enemies_spawned_total", "Enemies spawned", &self.enemies_spawned_total),
            ("frontier_enemies_killed_total", "Enemies killed", &self.enemies_killed_total),
            ("frontier_enemies_despawned_total", "Enemies despawned", &self.enemies_despawned_total),
            ("frontier_player_deaths_total", "Player deaths", &self.player_deaths_total),
            ("frontier_orbs_collected_total", "Orbs collected", &self.orbs_collected_total),
        ];
        for (name, help, counter) in counters {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
                counter.load(Ordering::Relaxed)
            ));
        }
        out
    }

    /// Render as a JSON status document
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "uptime_seconds": self.uptime_secs(),
            "lobbies_active": self.lobbies_active.load(Ordering::Relaxed),
            "sessions_active": self.sessions_active.load(Ordering::Relaxed),
            "ticks_total": self.ticks_total.load(Ordering::Relaxed),
            "messages_sent_total": self.messages_sent.load(Ordering::Relaxed),
            "enemies": {
                "spawned_total": self.enemies_spawned_total.load(Ordering::Relaxed),
                "killed_total": self.enemies_killed_total.load(Ordering::Relaxed),
                "despawned_total": self.enemies_despawned_total.load(Ordering::Relaxed),
            },
            "tick_time": {
                "last_us": self.tick_time_us.load(Ordering::Relaxed),
                "p95_us": self.tick_time_p95_us(),
                "max_us": self.tick_time_max_us.load(Ordering::Relaxed),
            },
        })
        .to_string()
    }
}

/// Serve /metrics (Prometheus), /json, and /health over plain HTTP
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    let response = if request.starts_with("GET /metrics") {
                        let body = metrics.to_prometheus();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /json") {
                        let body = metrics.to_json();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /health") || request.starts_with("GET /") {
                        let body = "OK";
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
