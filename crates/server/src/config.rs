//! Server configuration from conventional defaults and environment
//! overrides.

use std::net::IpAddr;

use koth_core::GameConfig;

/// Environment variable names recognized by [`ServerConfig::from_env`].
const ENV_BIND_ADDR: &str = "KOTH_BIND_ADDR";
const ENV_REQUEST_PORT: &str = "KOTH_REQUEST_PORT";
const ENV_PUBLISH_PORT: &str = "KOTH_PUBLISH_PORT";
const ENV_SEED: &str = "KOTH_SEED";
const ENV_GAME_CONFIG: &str = "KOTH_GAME_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {variable}")]
    InvalidValue { variable: &'static str, value: String },

    #[error("failed to read game config file {path:?}: {source}")]
    GameConfigRead {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse game config file {path:?}: {source}")]
    GameConfigParse {
        path: String,
        source: serde_json::Error,
    },
}

/// Per-session server settings.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    /// Request/reply endpoint port; 0 selects an ephemeral port.
    pub request_port: u16,
    /// Publish endpoint port; 0 selects an ephemeral port.
    pub publish_port: u16,
    /// Session RNG seed; a fixed seed makes the whole session replayable.
    pub seed: u64,
    pub game: GameConfig,
}

impl ServerConfig {
    pub const DEFAULT_REQUEST_PORT: u16 = 5555;
    pub const DEFAULT_PUBLISH_PORT: u16 = 5556;

    /// Conventional defaults with a randomly drawn session seed.
    pub fn new() -> Self {
        Self {
            bind_addr: IpAddr::from([0, 0, 0, 0]),
            request_port: Self::DEFAULT_REQUEST_PORT,
            publish_port: Self::DEFAULT_PUBLISH_PORT,
            seed: rand::random(),
            game: GameConfig::default(),
        }
    }

    /// Defaults overridden by `KOTH_BIND_ADDR`, `KOTH_REQUEST_PORT`,
    /// `KOTH_PUBLISH_PORT`, `KOTH_SEED`, and `KOTH_GAME_CONFIG` (a path to a
    /// JSON game parameter file).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();
        if let Some(addr) = env_var(ENV_BIND_ADDR) {
            config.bind_addr = parse_env(ENV_BIND_ADDR, &addr)?;
        }
        if let Some(port) = env_var(ENV_REQUEST_PORT) {
            config.request_port = parse_env(ENV_REQUEST_PORT, &port)?;
        }
        if let Some(port) = env_var(ENV_PUBLISH_PORT) {
            config.publish_port = parse_env(ENV_PUBLISH_PORT, &port)?;
        }
        if let Some(seed) = env_var(ENV_SEED) {
            config.seed = parse_env(ENV_SEED, &seed)?;
        }
        if let Some(path) = env_var(ENV_GAME_CONFIG) {
            let raw = std::fs::read_to_string(&path).map_err(|source| {
                ConfigError::GameConfigRead {
                    path: path.clone(),
                    source,
                }
            })?;
            config.game = serde_json::from_str(&raw).map_err(|source| {
                ConfigError::GameConfigParse { path, source }
            })?;
        }
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn parse_env<T: std::str::FromStr>(
    variable: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        variable,
        value: value.to_string(),
    })
}
