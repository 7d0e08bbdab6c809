//! API key limits lookup and blocking.

use super::error::RateLimitResult;
use crate::clock::Clock;
use crate::store::{KeyLayout, KeyValueStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Limits that apply to one API key for one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiLimits {
    /// Prefix of the bucket key, joined to the route's bucket key with `_`.
    pub key_prefix: String,

    /// Unix second until which the key is blocked.
    pub blocked_until: Option<i64>,
}

impl ApiLimits {
    /// Limits for an unblocked key.
    #[must_use]
    pub fn unblocked(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            blocked_until: None,
        }
    }

    /// Whether the key is blocked at `now`.
    #[must_use]
    pub fn is_blocked_at(&self, now: i64) -> bool {
        self.blocked_until.is_some_and(|until| until > now)
    }
}

/// Source of per API key limits.
#[async_trait]
pub trait ApiKeyCatalog: Send + Sync + std::fmt::Debug {
    /// Limits for `api_key` on the route `method path`.
    async fn limits(&self, api_key: &str, method: &str, path: &str) -> RateLimitResult<ApiLimits>;

    /// Block `api_key` until the unix second `until`.
    async fn block_until(&self, api_key: &str, until: i64) -> RateLimitResult<()>;
}

/// API key catalog that never blocks and uses the key itself as prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultApiKeys;

#[async_trait]
impl ApiKeyCatalog for DefaultApiKeys {
    async fn limits(&self, api_key: &str, _method: &str, _path: &str) -> RateLimitResult<ApiLimits> {
        Ok(ApiLimits::unblocked(api_key))
    }

    async fn block_until(&self, _api_key: &str, _until: i64) -> RateLimitResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedBlock {
    until: Option<i64>,
    checked_at: i64,
}

/// API key catalog backed by block markers in the shared store.
///
/// Markers expire on their own at the end of the block. Lookups are cached
/// for `refresh_secs` so a hot key costs one store read per refresh period.
#[derive(Debug)]
pub struct StoreApiKeys {
    store: Arc<dyn KeyValueStore>,
    keys: KeyLayout,
    clock: Arc<dyn Clock>,
    refresh_secs: i64,
    cache: RwLock<HashMap<String, CachedBlock>>,
}

impl StoreApiKeys {
    /// Default cache lifetime of a lookup.
    pub const DEFAULT_REFRESH_SECS: i64 = 5;

    /// Create a catalog reading block markers from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, keys: KeyLayout, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            keys,
            clock,
            refresh_secs: Self::DEFAULT_REFRESH_SECS,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Set how long a lookup stays cached.
    #[must_use]
    pub fn with_refresh_secs(mut self, refresh_secs: i64) -> Self {
        self.refresh_secs = refresh_secs.max(0);
        self
    }

    fn cached(&self, api_key: &str, now: i64) -> Option<CachedBlock> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        let entry = *cache.get(api_key)?;
        let still_blocked = entry.until.is_some_and(|until| until > now);
        (still_blocked || now - entry.checked_at < self.refresh_secs).then_some(entry)
    }

    fn remember(&self, api_key: &str, until: Option<i64>, now: i64) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(api_key.to_string(), CachedBlock { until, checked_at: now });
    }
}

#[async_trait]
impl ApiKeyCatalog for StoreApiKeys {
    async fn limits(&self, api_key: &str, _method: &str, _path: &str) -> RateLimitResult<ApiLimits> {
        let now = self.clock.now_secs();
        if let Some(entry) = self.cached(api_key, now) {
            return Ok(ApiLimits {
                key_prefix: api_key.to_string(),
                blocked_until: entry.until.filter(|&until| until > now),
            });
        }

        let until = self
            .store
            .get(&self.keys.blocked_key(api_key))
            .await?
            .and_then(|raw| match raw.parse::<i64>() {
                Ok(until) => Some(until),
                Err(_) => {
                    debug!(api_key, value = %raw, "ignoring malformed block marker");
                    None
                },
            });
        self.remember(api_key, until, now);

        Ok(ApiLimits {
            key_prefix: api_key.to_string(),
            blocked_until: until.filter(|&until| until > now),
        })
    }

    async fn block_until(&self, api_key: &str, until: i64) -> RateLimitResult<()> {
        let now = self.clock.now_secs();
        let ttl = until - now;
        if ttl <= 0 {
            return Ok(());
        }
        self.store
            .set_expiring(&self.keys.blocked_key(api_key), &until.to_string(), ttl as u64)
            .await?;
        self.remember(api_key, Some(until), now);
        info!(api_key, until, "api key blocked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn store_keys(now: i64) -> (StoreApiKeys, Arc<MemoryStore>, ManualClock) {
        let clock = ManualClock::new(now);
        let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
        let keys = StoreApiKeys::new(store.clone(), KeyLayout::default(), Arc::new(clock.clone()));
        (keys, store, clock)
    }

    #[tokio::test]
    async fn test_default_api_keys() {
        let keys = DefaultApiKeys;
        let limits = keys.limits("K", "GET", "/a").await.unwrap();
        assert_eq!(limits, ApiLimits::unblocked("K"));
        keys.block_until("K", i64::MAX).await.unwrap();
        assert!(!keys.limits("K", "GET", "/a").await.unwrap().is_blocked_at(0));
    }

    #[tokio::test]
    async fn test_block_until_expires() {
        let (keys, store, clock) = store_keys(1_000);
        keys.block_until("K", 1_030).await.unwrap();
        assert_eq!(
            store.get("dynlimits_blocked_K").await.unwrap(),
            Some("1030".to_string())
        );

        let limits = keys.limits("K", "GET", "/a").await.unwrap();
        assert!(limits.is_blocked_at(1_000));
        assert_eq!(limits.key_prefix, "K");

        clock.advance(30);
        let limits = keys.limits("K", "GET", "/a").await.unwrap();
        assert!(!limits.is_blocked_at(clock.now_secs()));
    }

    #[tokio::test]
    async fn test_peer_block_seen_after_refresh() {
        let (keys, store, clock) = store_keys(1_000);
        assert!(!keys.limits("K", "GET", "/a").await.unwrap().is_blocked_at(1_000));

        // Another instance writes the marker directly.
        store
            .set_expiring("dynlimits_blocked_K", "1100", 100)
            .await
            .unwrap();
        assert!(!keys.limits("K", "GET", "/a").await.unwrap().is_blocked_at(1_000));

        clock.advance(StoreApiKeys::DEFAULT_REFRESH_SECS);
        let limits = keys.limits("K", "GET", "/a").await.unwrap();
        assert_eq!(limits.blocked_until, Some(1_100));
    }

    #[tokio::test]
    async fn test_block_in_past_is_ignored() {
        let (keys, store, _) = store_keys(1_000);
        keys.block_until("K", 900).await.unwrap();
        assert_eq!(store.entry_count(), 0);
    }
}
