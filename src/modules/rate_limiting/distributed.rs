//! Sliding window counters kept in the shared store.

use super::error::{RateLimitError, RateLimitResult};
use super::window::{WindowCounter, WindowSnapshot, BUCKET_TTL_SECS, WINDOW_SECS};
use crate::store::{KeyLayout, KeyValueStore, WindowBuckets};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const WINDOW: i64 = WINDOW_SECS as i64;

/// Store-backed window counter shared by every gateway instance.
///
/// Each key has one hash per minute mapping second-of-minute to a count.
/// A window ending at second `s` is rebuilt from the hash of `s`'s minute and
/// the one before it.
#[derive(Debug, Clone)]
pub struct DistributedWindowCounter {
    store: Arc<dyn KeyValueStore>,
    keys: KeyLayout,
}

impl DistributedWindowCounter {
    /// Create a counter over `store` using the given key layout.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, keys: KeyLayout) -> Self {
        Self { store, keys }
    }

    /// Key layout in use.
    #[must_use]
    pub fn keys(&self) -> &KeyLayout {
        &self.keys
    }

    /// Build a window ending at `timestamp_sec` from raw store buckets.
    ///
    /// # Errors
    ///
    /// `QuotaNotFound` when the quota record is absent, `InvalidQuota` when it
    /// is not an integer.
    pub fn snapshot_from_buckets(
        key: &str,
        timestamp_sec: i64,
        buckets: &WindowBuckets,
    ) -> RateLimitResult<WindowSnapshot> {
        let raw_quota = buckets
            .quota
            .as_deref()
            .ok_or_else(|| RateLimitError::QuotaNotFound(key.to_string()))?;
        let quota = raw_quota
            .trim()
            .parse::<i64>()
            .map_err(|_| RateLimitError::InvalidQuota {
                key: key.to_string(),
                value: raw_quota.to_string(),
            })?;

        let mut snapshot = WindowSnapshot::empty(timestamp_sec, quota);
        let current_sec = timestamp_sec.rem_euclid(WINDOW);

        for (minutes_back, pairs) in [&buckets.current, &buckets.previous].into_iter().enumerate() {
            for (raw_sec, raw_count) in pairs {
                let (Ok(sec), Ok(count)) = (raw_sec.parse::<i64>(), raw_count.parse::<i64>()) else {
                    debug!(key, field = %raw_sec, value = %raw_count, "skipping malformed window entry");
                    continue;
                };
                let sec = sec - WINDOW * minutes_back as i64;
                let slot = (WINDOW - 1) - (current_sec - sec);
                if (0..WINDOW).contains(&slot) {
                    snapshot.window[slot as usize] = count;
                    snapshot.sum += count;
                }
            }
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl WindowCounter for DistributedWindowCounter {
    async fn fetch(&self, key: &str, timestamp_sec: i64) -> RateLimitResult<WindowSnapshot> {
        let minute = timestamp_sec.div_euclid(WINDOW);
        let buckets = self
            .store
            .read_window(
                &self.keys.quota_key(key),
                &self.keys.window_key(minute, key),
                &self.keys.window_key(minute - 1, key),
            )
            .await?;
        Self::snapshot_from_buckets(key, timestamp_sec, &buckets)
    }

    async fn increment(&self, key: &str, timestamp_sec: i64) -> RateLimitResult<()> {
        let minute = timestamp_sec.div_euclid(WINDOW);
        let sec = timestamp_sec.rem_euclid(WINDOW);
        self.store
            .hash_increment(&self.keys.window_key(minute, key), sec, BUCKET_TTL_SECS)
            .await?;
        Ok(())
    }

    async fn set_quota(&self, key: &str, quota: i64) -> RateLimitResult<()> {
        self.store
            .set(&self.keys.quota_key(key), &quota.to_string())
            .await?;
        Ok(())
    }

    async fn set_quotas(&self, quotas: &[(String, i64)]) -> RateLimitResult<()> {
        let entries: Vec<(String, String)> = quotas
            .iter()
            .map(|(key, quota)| (self.keys.quota_key(key), quota.to_string()))
            .collect();
        self.store.set_many(&entries).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn counter_at(now: i64) -> (DistributedWindowCounter, Arc<MemoryStore>, ManualClock) {
        let clock = ManualClock::new(now);
        let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
        let counter = DistributedWindowCounter::new(store.clone(), KeyLayout::default());
        (counter, store, clock)
    }

    #[tokio::test]
    async fn test_fetch_without_quota_is_missing_policy() {
        let (counter, _, _) = counter_at(600);
        counter.increment("K_GET_/a", 600).await.unwrap();

        let err = counter.fetch("K_GET_/a", 600).await.unwrap_err();
        assert!(matches!(err, RateLimitError::QuotaNotFound(ref k) if k == "K_GET_/a"));
    }

    #[tokio::test]
    async fn test_zero_quota_is_not_missing() {
        let (counter, _, _) = counter_at(600);
        counter.set_quota("K_GET_/a", 0).await.unwrap();
        let snapshot = counter.fetch("K_GET_/a", 600).await.unwrap();
        assert_eq!(snapshot.quota, 0);
        assert!(snapshot.is_exhausted());
    }

    #[tokio::test]
    async fn test_window_spans_two_minutes() {
        let (counter, _, _) = counter_at(0);
        counter.set_quota("k", 100).await.unwrap();

        // Minute 10 covers 600..=659, minute 11 covers 660..=719.
        counter.increment("k", 630).await.unwrap();
        counter.increment("k", 650).await.unwrap();
        counter.increment("k", 650).await.unwrap();
        counter.increment("k", 665).await.unwrap();

        let snapshot = counter.fetch("k", 690).await.unwrap();
        // 630 is older than 631 and falls out.
        assert_eq!(snapshot.sum, 3);
        assert_eq!(snapshot.window[59 - 25], 1);
        assert_eq!(snapshot.window[59 - 40], 2);
        assert_eq!(snapshot.num_empty_slots_at_start(), 19);

        let snapshot = counter.fetch("k", 665).await.unwrap();
        assert_eq!(snapshot.sum, 4);
        assert_eq!(snapshot.window[59 - 35], 1);
    }

    #[tokio::test]
    async fn test_buckets_expire() {
        let (counter, _, clock) = counter_at(600);
        counter.set_quota("k", 5).await.unwrap();
        counter.increment("k", 600).await.unwrap();

        clock.advance(BUCKET_TTL_SECS as i64);
        let snapshot = counter.fetch("k", 600).await.unwrap();
        assert_eq!(snapshot.sum, 0);
    }

    #[tokio::test]
    async fn test_set_quotas_batches() {
        let (counter, store, _) = counter_at(0);
        counter
            .set_quotas(&[("a".to_string(), 3), ("b".to_string(), 9)])
            .await
            .unwrap();
        assert_eq!(
            store.get("dynlimits_reqpermin_b").await.unwrap(),
            Some("9".to_string())
        );
        assert_eq!(counter.fetch("a", 0).await.unwrap().quota, 3);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let buckets = WindowBuckets {
            quota: Some("10".to_string()),
            current: vec![
                ("5".to_string(), "2".to_string()),
                ("x".to_string(), "1".to_string()),
                ("6".to_string(), "many".to_string()),
            ],
            previous: vec![("59".to_string(), "4".to_string())],
        };
        let snapshot = DistributedWindowCounter::snapshot_from_buckets("k", 605, &buckets).unwrap();
        assert_eq!(snapshot.sum, 6);
        assert_eq!(snapshot.window[59], 2);
        assert_eq!(snapshot.window[53], 4);
    }

    #[test]
    fn test_invalid_quota() {
        let buckets = WindowBuckets {
            quota: Some("lots".to_string()),
            ..WindowBuckets::default()
        };
        let err = DistributedWindowCounter::snapshot_from_buckets("k", 0, &buckets).unwrap_err();
        assert!(matches!(err, RateLimitError::InvalidQuota { .. }));
    }
}
