//! Service configuration, read from the environment.

use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_REQUEST_CHANNEL: &str = "userhub:user";
pub const DEFAULT_EVENTS_CHANNEL: &str = "userhub:user:events";
pub const DEFAULT_HEALTH_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be `true` or `false`, got {value:?}")]
    InvalidBool { var: &'static str, value: String },

    #[error("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")]
    MissingDatabaseUrl,

    #[error("{var} is not a socket address: {value:?}")]
    InvalidAddr { var: &'static str, value: String },

    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

/// Runtime configuration of the service process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Postgres + Redis notifications when true; in-memory store and bus otherwise.
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub redis_url: String,
    /// Channel requests arrive on.
    pub request_channel: String,
    /// Channel CREATED/DELETED notifications are published on.
    pub events_channel: String,
    pub health_addr: SocketAddr,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let use_persistent_stores = match lookup("USE_PERSISTENT_STORES") {
            None => false,
            Some(value) => value.trim().parse::<bool>().map_err(|_| ConfigError::InvalidBool {
                var: "USE_PERSISTENT_STORES",
                value,
            })?,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        let health_addr = {
            let raw = lookup("USERHUB_HEALTH_ADDR").unwrap_or_else(|| DEFAULT_HEALTH_ADDR.to_string());
            raw.parse::<SocketAddr>().map_err(|_| ConfigError::InvalidAddr {
                var: "USERHUB_HEALTH_ADDR",
                value: raw.clone(),
            })?
        };

        Ok(Self {
            use_persistent_stores,
            database_url,
            redis_url: non_empty(&lookup, "REDIS_URL", DEFAULT_REDIS_URL)?,
            request_channel: non_empty(&lookup, "USERHUB_REQUEST_CHANNEL", DEFAULT_REQUEST_CHANNEL)?,
            events_channel: non_empty(&lookup, "USERHUB_EVENTS_CHANNEL", DEFAULT_EVENTS_CHANNEL)?,
            health_addr,
        })
    }
}

fn non_empty<F>(lookup: &F, var: &'static str, default: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default.to_string()),
        Some(value) if value.trim().is_empty() => Err(ConfigError::Empty { var }),
        Some(value) => Ok(value),
    }
}
