//! Engine configuration.
//!
//! One validated struct, constructed explicitly and passed into the engine.
//! `from_env` reads `COGNIMODE_*` variables (a `.env` file is honored) so
//! deployments can override the defaults without a config file format.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::EngineError;

/// Tunables for the engine and its background tasks.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// In-memory history cap; oldest entries evicted beyond this.
    #[validate(range(min = 1))]
    pub history_cap: usize,
    /// Entries older than this many days are purged by the cleanup task.
    #[validate(range(min = 1))]
    pub retention_days: i64,
    /// Interval of the analytics refresh task, seconds.
    #[validate(range(min = 1))]
    pub analytics_refresh_secs: u64,
    /// Interval of the retention cleanup task, seconds.
    #[validate(range(min = 1))]
    pub cleanup_interval_secs: u64,
    /// Sessions idle longer than this are closed by the sweep task, seconds.
    #[validate(range(min = 1))]
    pub session_idle_timeout_secs: u64,
    /// Capacity of the transition broadcast channel.
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_cap: 10_000,
            retention_days: 90,
            analytics_refresh_secs: 300,
            cleanup_interval_secs: 86_400,
            session_idle_timeout_secs: 1_800,
            event_channel_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the environment, falling back to defaults
    /// for anything unset. Values that fail to parse or validate are errors,
    /// not silent fallbacks.
    pub fn from_env() -> Result<Self, EngineError> {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        if let Some(v) = read_env("COGNIMODE_HISTORY_CAP")? {
            config.history_cap = v;
        }
        if let Some(v) = read_env("COGNIMODE_RETENTION_DAYS")? {
            config.retention_days = v;
        }
        if let Some(v) = read_env("COGNIMODE_ANALYTICS_REFRESH_SECS")? {
            config.analytics_refresh_secs = v;
        }
        if let Some(v) = read_env("COGNIMODE_CLEANUP_INTERVAL_SECS")? {
            config.cleanup_interval_secs = v;
        }
        if let Some(v) = read_env("COGNIMODE_SESSION_IDLE_TIMEOUT_SECS")? {
            config.session_idle_timeout_secs = v;
        }
        if let Some(v) = read_env("COGNIMODE_EVENT_CHANNEL_CAPACITY")? {
            config.event_channel_capacity = v;
        }

        config.validate()?;
        Ok(config)
    }
}

fn read_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, EngineError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| EngineError::Config(format!("{} has invalid value '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}
