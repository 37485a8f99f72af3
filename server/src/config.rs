//! Static server configuration, supplied once at process start.

use clap::ValueEnum;
use shared::{World, WorldError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("tick rate {0} is outside 1..=240")]
    TickRate(u32),

    #[error("stats interval must be at least 1")]
    StatsInterval,

    #[error(transparent)]
    World(#[from] WorldError),
}

/// Which participants are included in each cycle's movement snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BroadcastPolicy {
    /// Only participants whose intent was written since the last cycle.
    #[default]
    OnChange,
    /// Every live participant, every cycle.
    EveryTick,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub world: World,
    /// Target cycles per second.
    pub tick_rate: u32,
    pub policy: BroadcastPolicy,
    /// Ticks between periodic statistics lines.
    pub stats_interval: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            world: World::default(),
            tick_rate: 30,
            policy: BroadcastPolicy::OnChange,
            stats_interval: 60,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=240).contains(&self.tick_rate) {
            return Err(ConfigError::TickRate(self.tick_rate));
        }
        if self.stats_interval == 0 {
            return Err(ConfigError::StatsInterval);
        }
        self.world.validate()?;
        Ok(())
    }
}
