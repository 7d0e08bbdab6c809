//! # Shared Store
//!
//! Key-value store shared by every gateway instance. It holds quota records,
//! per-minute sliding window hashes and the catalog coordination keys.
//!
//! The [`KeyValueStore`] trait exposes exactly the primitives the gateway
//! needs, each one a single round trip. Two backends implement it:
//!
//! - [`RedisStore`]: the production backend, a redis connection manager with
//!   a bounded number of concurrent operations.
//! - [`MemoryStore`]: a process-local map with TTLs, used for single instance
//!   deployments and tests.

mod config;
mod error;
mod keys;
mod memory;
mod redis_store;

pub use self::config::{StoreBackend, StoreConfig};
pub use self::error::{StoreError, StoreResult};
pub use self::keys::KeyLayout;
pub use self::memory::{MemoryStore, SWEEP_INTERVAL_SECS};
pub use self::redis_store::RedisStore;

use crate::clock::Clock;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Raw contents of a sliding window read: the quota record and the hashes of
/// the current and previous minute, as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowBuckets {
    /// Quota record, `None` when no policy was ever published.
    pub quota: Option<String>,

    /// `(second, count)` pairs of the current minute.
    pub current: Vec<(String, String)>,

    /// `(second, count)` pairs of the previous minute.
    pub previous: Vec<(String, String)>,
}

/// Primitive operations on the shared store.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Read a string value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Read several string values in one round trip.
    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>>;

    /// Write a string value without expiry.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Write several string values in one pipelined round trip.
    async fn set_many(&self, entries: &[(String, String)]) -> StoreResult<()>;

    /// Write a string value that expires after `ttl_secs`.
    async fn set_expiring(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()>;

    /// Write a value with expiry only if the key is absent (`SET NX EX`).
    ///
    /// Returns `true` when the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<bool>;

    /// Apply writes and deletes as one transaction.
    async fn apply_atomically(
        &self,
        sets: &[(String, String)],
        deletes: &[String],
    ) -> StoreResult<()>;

    /// Increment `field` of the hash at `key` by one and refresh its expiry.
    async fn hash_increment(&self, key: &str, field: i64, ttl_secs: u64) -> StoreResult<()>;

    /// Read a quota record and two window hashes in one transaction.
    async fn read_window(
        &self,
        quota_key: &str,
        current_key: &str,
        previous_key: &str,
    ) -> StoreResult<WindowBuckets>;

    /// Check the backend is reachable.
    async fn ping(&self) -> StoreResult<()>;
}

/// Create a store backend from configuration.
///
/// # Errors
///
/// Returns an error if the redis backend cannot connect.
pub async fn create_store(
    config: &StoreConfig,
    clock: Arc<dyn Clock>,
) -> StoreResult<Arc<dyn KeyValueStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("using in-memory store");
            Ok(Arc::new(MemoryStore::with_clock(clock)))
        },
        StoreBackend::Redis => {
            let store = RedisStore::connect(config).await?;
            info!(address = %config.address, "connected to redis store");
            Ok(Arc::new(store))
        },
    }
}
