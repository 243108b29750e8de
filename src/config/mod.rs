//! Configuration module - environment variable parsing and simulation tunables

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::body::HeightLimits;
use crate::game::interpolation::InterpolationTuning;
use crate::game::projectile::ProjectileTuning;
use crate::game::thrust::ThrustTuning;
use crate::game::MovementTuning;
use crate::replication::ReplicationTuning;
use crate::util::time::DEFAULT_FRAME_RATE;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Status endpoint binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Base URL of the shared REST store; `None` runs an in-process store
    pub store_url: Option<String>,
    /// How often REST subscriptions poll the store (milliseconds)
    pub store_poll_ms: u64,

    /// Number of headless clients this process drives
    pub client_count: usize,
    /// Simulation frames per second
    pub frame_rate: u32,
    /// Seed for spawn placement and autopilot input
    pub seed: u64,

    /// Simulation tunables
    pub sim: SimConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render-style PORT wins over SERVER_ADDR
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let sim = SimConfig {
            planet_radius: parse_or("PLANET_RADIUS", SimConfig::DEFAULT_PLANET_RADIUS)?,
            ..SimConfig::default()
        };
        if !(sim.planet_radius.is_finite() && sim.planet_radius > 0.0) {
            return Err(ConfigError::Invalid("PLANET_RADIUS"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            store_url: env::var("STORE_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            store_poll_ms: parse_or("STORE_POLL_MS", 100)?,

            client_count: parse_or("CLIENT_COUNT", 3)?,
            frame_rate: parse_or("FRAME_RATE", DEFAULT_FRAME_RATE)?,
            seed: parse_or("SEED", 7)?,

            sim,
        })
    }
}

/// Read an optional variable, falling back to `default` when unset
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Everything the simulation core needs, fixed for a session
#[derive(Clone, Debug)]
pub struct SimConfig {
    /// Base radius reported by the planet geometry
    pub planet_radius: f32,
    pub heights: HeightLimits,
    pub movement: MovementTuning,
    pub thrust: ThrustTuning,
    pub projectile: ProjectileTuning,
    pub interpolation: InterpolationTuning,
    pub replication: ReplicationTuning,
    /// Collision radius of an avatar body
    pub avatar_radius: f32,
}

impl SimConfig {
    pub const DEFAULT_PLANET_RADIUS: f32 = 5.0;
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            planet_radius: Self::DEFAULT_PLANET_RADIUS,
            heights: HeightLimits::default(),
            movement: MovementTuning::default(),
            thrust: ThrustTuning::default(),
            projectile: ProjectileTuning::default(),
            interpolation: InterpolationTuning::default(),
            replication: ReplicationTuning::default(),
            avatar_radius: 0.5,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
