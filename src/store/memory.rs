//! Process-local store backend.

use super::error::{StoreError, StoreResult};
use super::{KeyValueStore, WindowBuckets};
use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Minimum gap between two sweeps of expired entries.
pub const SWEEP_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, i64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    /// Unix second at which the entry stops being visible.
    expires_at: Option<i64>,
}

impl Entry {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory implementation of [`KeyValueStore`].
///
/// Every operation runs under a single mutex, which gives the same
/// all-or-nothing visibility as a redis transaction. Expiry is evaluated
/// against the configured [`Clock`]: expired entries are hidden from reads
/// at once and removed by writes at most every [`SWEEP_INTERVAL_SECS`].
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    last_sweep: AtomicI64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store whose expiry follows `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_secs();
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            last_sweep: AtomicI64::new(now),
        }
    }

    /// Remove expired entries.
    pub fn cleanup_expired(&self) {
        let now = self.clock.now_secs();
        self.sweep(&mut self.lock(), now);
    }

    fn sweep(&self, entries: &mut HashMap<String, Entry>, now: i64) {
        self.last_sweep.store(now, Ordering::Relaxed);
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "swept expired entries");
        }
    }

    /// Sweep under an already held lock when the last sweep is old enough.
    fn sweep_if_due(&self, entries: &mut HashMap<String, Entry>, now: i64) {
        if now - self.last_sweep.load(Ordering::Relaxed) >= SWEEP_INTERVAL_SECS {
            self.sweep(entries, now);
        }
    }

    /// Number of stored entries, expired or not.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live_string(
        entries: &HashMap<String, Entry>,
        key: &str,
        now: i64,
    ) -> StoreResult<Option<String>> {
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Str(s) => Ok(Some(s.clone())),
                Value::Hash(_) => Err(StoreError::Data(format!("{key} holds a hash"))),
            },
            _ => Ok(None),
        }
    }

    fn live_hash(
        entries: &HashMap<String, Entry>,
        key: &str,
        now: i64,
    ) -> StoreResult<Vec<(String, String)>> {
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Hash(h) => Ok(h.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()),
                Value::Str(_) => Err(StoreError::Data(format!("{key} holds a string"))),
            },
            _ => Ok(Vec::new()),
        }
    }

    fn put(entries: &mut HashMap<String, Entry>, key: &str, value: &str, expires_at: Option<i64>) {
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at,
            },
        );
    }

    fn ttl_deadline(&self, ttl_secs: u64) -> i64 {
        self.clock
            .now_secs()
            .saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now_secs();
        Self::live_string(&self.lock(), key, now)
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        let now = self.clock.now_secs();
        let entries = self.lock();
        keys.iter()
            .map(|key| Self::live_string(&entries, key, now))
            .collect()
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        Self::put(&mut self.lock(), key, value, None);
        Ok(())
    }

    async fn set_many(&self, entries: &[(String, String)]) -> StoreResult<()> {
        let mut store = self.lock();
        for (key, value) in entries {
            Self::put(&mut store, key, value, None);
        }
        Ok(())
    }

    async fn set_expiring(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let now = self.clock.now_secs();
        let deadline = self.ttl_deadline(ttl_secs);
        let mut entries = self.lock();
        self.sweep_if_due(&mut entries, now);
        Self::put(&mut entries, key, value, Some(deadline));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<bool> {
        let now = self.clock.now_secs();
        let deadline = self.ttl_deadline(ttl_secs);
        let mut entries = self.lock();
        self.sweep_if_due(&mut entries, now);
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        Self::put(&mut entries, key, value, Some(deadline));
        Ok(true)
    }

    async fn apply_atomically(
        &self,
        sets: &[(String, String)],
        deletes: &[String],
    ) -> StoreResult<()> {
        let mut entries = self.lock();
        for (key, value) in sets {
            Self::put(&mut entries, key, value, None);
        }
        for key in deletes {
            entries.remove(key);
        }
        Ok(())
    }

    async fn hash_increment(&self, key: &str, field: i64, ttl_secs: u64) -> StoreResult<()> {
        let now = self.clock.now_secs();
        let deadline = self.ttl_deadline(ttl_secs);
        let mut entries = self.lock();
        self.sweep_if_due(&mut entries, now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: Some(deadline),
        });
        if !entry.is_live(now) {
            entry.value = Value::Hash(HashMap::new());
        }
        match &mut entry.value {
            Value::Hash(h) => *h.entry(field.to_string()).or_insert(0) += 1,
            Value::Str(_) => return Err(StoreError::Data(format!("{key} holds a string"))),
        }
        entry.expires_at = Some(deadline);
        Ok(())
    }

    async fn read_window(
        &self,
        quota_key: &str,
        current_key: &str,
        previous_key: &str,
    ) -> StoreResult<WindowBuckets> {
        let now = self.clock.now_secs();
        let entries = self.lock();
        Ok(WindowBuckets {
            quota: Self::live_string(&entries, quota_key, now)?,
            current: Self::live_hash(&entries, current_key, now)?,
            previous: Self::live_hash(&entries, previous_key, now)?,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_at(now: i64) -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new(now);
        (MemoryStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _) = store_at(0);
        assert_eq!(store.get("a").await.unwrap(), None);
        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));

        let values = store
            .get_many(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("1".to_string()), None]);
    }

    #[tokio::test]
    async fn test_set_if_absent_respects_expiry() {
        let (store, clock) = store_at(1000);
        assert!(store.set_if_absent("lock", "x", 300).await.unwrap());
        assert!(!store.set_if_absent("lock", "y", 300).await.unwrap());

        clock.advance(299);
        assert!(!store.set_if_absent("lock", "y", 300).await.unwrap());

        clock.advance(1);
        assert!(store.set_if_absent("lock", "y", 300).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap(), Some("y".to_string()));
    }

    #[tokio::test]
    async fn test_apply_atomically() {
        let (store, _) = store_at(0);
        store.set("gone", "1").await.unwrap();
        store
            .apply_atomically(&[("kept".to_string(), "2".to_string())], &["gone".to_string()])
            .await
            .unwrap();
        assert_eq!(store.get("gone").await.unwrap(), None);
        assert_eq!(store.get("kept").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_hash_increment_and_read_window() {
        let (store, clock) = store_at(100);
        store.set("quota", "5").await.unwrap();
        store.hash_increment("cur", 40, 180).await.unwrap();
        store.hash_increment("cur", 40, 180).await.unwrap();
        store.hash_increment("prev", 59, 180).await.unwrap();

        let buckets = store.read_window("quota", "cur", "prev").await.unwrap();
        assert_eq!(buckets.quota.as_deref(), Some("5"));
        assert_eq!(buckets.current, vec![("40".to_string(), "2".to_string())]);
        assert_eq!(buckets.previous, vec![("59".to_string(), "1".to_string())]);

        clock.advance(180);
        let buckets = store.read_window("quota", "cur", "prev").await.unwrap();
        assert!(buckets.current.is_empty());
        assert!(buckets.previous.is_empty());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_data_error() {
        let (store, _) = store_at(0);
        store.set("k", "v").await.unwrap();
        let err = store.hash_increment("k", 1, 10).await.unwrap_err();
        assert!(matches!(err, StoreError::Data(_)));
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let (store, clock) = store_at(0);
        store.set_expiring("short", "1", 1).await.unwrap();
        store.set("long", "1").await.unwrap();
        assert_eq!(store.entry_count(), 2);

        clock.advance(2);
        store.cleanup_expired();
        assert_eq!(store.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_writes_sweep_expired_buckets() {
        let (store, clock) = store_at(0);
        for minute in 0..500i64 {
            clock.set(minute * 60);
            store
                .hash_increment(&format!("scw_{minute}_K_GET_/a"), 0, 180)
                .await
                .unwrap();
            assert!(store.entry_count() <= 4, "minute {minute}: {}", store.entry_count());
        }
    }

    #[tokio::test]
    async fn test_sweep_waits_for_interval() {
        let (store, clock) = store_at(0);
        store.set_expiring("a", "1", 1).await.unwrap();

        clock.advance(SWEEP_INTERVAL_SECS - 1);
        store.set_expiring("b", "1", 1).await.unwrap();
        assert_eq!(store.entry_count(), 2);
        assert_eq!(store.get("a").await.unwrap(), None);

        clock.advance(1);
        store.set_expiring("c", "1", 1).await.unwrap();
        assert_eq!(store.entry_count(), 1);
    }
}
