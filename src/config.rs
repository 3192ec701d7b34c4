use std::net::{IpAddr, Ipv4Addr};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Port for the Prometheus/JSON metrics endpoint
    pub metrics_port: u16,
    /// Maximum number of concurrent lobbies
    pub max_lobbies: usize,
    /// Maximum human players per lobby
    pub max_players_per_lobby: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4600,
            metrics_port: 9090,
            max_lobbies: 64,
            max_players_per_lobby: 16,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.port = parsed,
                _ => tracing::warn!("Invalid PORT '{}', using default", port),
            }
        }

        if let Ok(port) = std::env::var("METRICS_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.metrics_port = parsed,
                _ => tracing::warn!("Invalid METRICS_PORT '{}', using default", port),
            }
        }

        if let Ok(max_lobbies) = std::env::var("MAX_LOBBIES") {
            match max_lobbies.parse::<usize>() {
                Ok(parsed) if (1..=10_000).contains(&parsed) => config.max_lobbies = parsed,
                _ => tracing::warn!("MAX_LOBBIES must be 1-10000, using default"),
            }
        }

        if let Ok(max_players) = std::env::var("MAX_PLAYERS_PER_LOBBY") {
            match max_players.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.max_players_per_lobby = parsed,
                _ => tracing::warn!("Invalid MAX_PLAYERS_PER_LOBBY '{}', using default", max_players),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.port == self.metrics_port {
            return Err("metrics_port must differ from port".to_string());
        }
        if self.max_lobbies == 0 {
            return Err("max_lobbies must be at least 1".to_string());
        }
        if self.max_players_per_lobby == 0 {
            return Err("max_players_per_lobby must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Per-world simulation tuning
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Seed all world-deterministic generation derives from
    pub world_seed: u64,
    /// Bots maintained while a lobby has human players
    pub target_bots: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            world_seed: 0x5eed_0f_f0e5,
            target_bots: crate::world::constants::bot::TARGET_COUNT,
        }
    }
}

impl SimulationConfig {
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(seed) = std::env::var("WORLD_SEED") {
            match seed.parse::<u64>() {
                Ok(parsed) => config.world_seed = parsed,
                Err(_) => tracing::warn!("Invalid WORLD_SEED '{}', using default", seed),
            }
        }

        if let Ok(bots) = std::env::var("TARGET_BOTS") {
            match bots.parse::<usize>() {
                Ok(parsed) if parsed <= 64 => config.target_bots = parsed,
                _ => tracing::warn!("TARGET_BOTS must be 0-64, using default"),
            }
        }

        config
    }
}
