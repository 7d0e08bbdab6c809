//! Configuration for the shared store.

use super::keys::KeyLayout;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which store backs quotas, windows and coordination keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Redis shared by every gateway instance.
    #[default]
    Redis,
    /// Process-local store, for single instance deployments and tests.
    Memory,
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection.
    pub backend: StoreBackend,

    /// Redis connection URL.
    pub address: String,

    /// Maximum number of concurrent store operations.
    pub max_connections: usize,

    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Per-command timeout in milliseconds.
    pub command_timeout_ms: u64,

    /// Key prefixes.
    pub keys: KeyLayout,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            address: "redis://127.0.0.1:6379".to_string(),
            max_connections: 300,
            connect_timeout_ms: 300,
            command_timeout_ms: 200,
            keys: KeyLayout::default(),
        }
    }
}

impl StoreConfig {
    /// Connect timeout as a duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Command timeout as a duration.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
