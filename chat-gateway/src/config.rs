use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_ADDR: &str = "0.0.0.0:9001";
const DEFAULT_DB_PATH: &str = "market-chat.db";
const DEFAULT_EDIT_WINDOW_SECS: u64 = 120;

pub const ADDR_VAR: &str = "CHAT_GATEWAY_ADDR";
pub const DB_VAR: &str = "CHAT_GATEWAY_DB";
pub const JWT_SECRET_VAR: &str = "CHAT_GATEWAY_JWT_SECRET";
pub const EDIT_WINDOW_VAR: &str = "CHAT_GATEWAY_EDIT_WINDOW_SECS";

/// Runtime settings, read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: String,
    pub database_path: PathBuf,
    /// Shared HS256 secret. `None` runs the gateway without authentication.
    pub jwt_secret: Option<String>,
    /// How long after sending a message may still be edited. `None` means forever.
    pub edit_window: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            jwt_secret: None,
            edit_window: Some(Duration::from_secs(DEFAULT_EDIT_WINDOW_SECS)),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(addr) = get(ADDR_VAR) {
            config.addr = addr;
        }
        if let Some(path) = get(DB_VAR) {
            config.database_path = PathBuf::from(path);
        }
        config.jwt_secret = get(JWT_SECRET_VAR);

        if let Some(raw) = get(EDIT_WINDOW_VAR) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::Invalid {
                    var: EDIT_WINDOW_VAR,
                    value: raw.clone(),
                    reason: e.to_string(),
                })?;
            config.edit_window = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }
}
