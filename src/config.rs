//! Application configuration.

use crate::auth::{default_credentials, Credential};
use crate::error::{Result, TrackerError};
use crate::store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Everything [`Tracker::open`](crate::app::Tracker::open) needs.
///
/// Every field has a default, so a config file only lists what it changes:
///
/// ```json
/// { "store": { "path": "/var/lib/lpg" }, "recent_limit": 10 }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub store: StoreConfig,

    /// Customers shown on the dashboard's recent list.
    pub recent_limit: usize,

    /// Quiet period before a typed search term is run.
    pub search_debounce_ms: u64,

    /// Accepted logins.
    pub users: Vec<Credential>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            recent_limit: 5,
            search_debounce_ms: 300,
            users: default_credentials(),
        }
    }
}

impl TrackerConfig {
    /// Read a JSON config file and check it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| TrackerError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.recent_limit == 0 {
            return Err(TrackerError::Config("recent_limit must be positive".into()));
        }
        if self.store.subscription_buffer == 0 {
            return Err(TrackerError::Config(
                "store.subscription_buffer must be positive".into(),
            ));
        }
        if self.users.is_empty() {
            return Err(TrackerError::Config("no users configured".into()));
        }
        Ok(())
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}
