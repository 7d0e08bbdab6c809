//! Sliding window read model shared by the local and distributed counters.

use super::error::RateLimitResult;
use async_trait::async_trait;

/// Number of one-second slots in a window.
pub const WINDOW_SECS: usize = 60;

/// Lifetime of a per-minute bucket in the shared store.
pub const BUCKET_TTL_SECS: u64 = 180;

/// Per-second request counts for the 60 seconds ending at `timestamp_sec`.
///
/// Slot 59 holds the requested second, slot 0 the second 59 seconds before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Last second covered by the window.
    pub timestamp_sec: i64,

    /// Counts, oldest first.
    pub window: [i64; WINDOW_SECS],

    /// Sum of `window`.
    pub sum: i64,

    /// Requests allowed per minute.
    pub quota: i64,
}

impl WindowSnapshot {
    /// An empty window ending at `timestamp_sec`.
    #[must_use]
    pub fn empty(timestamp_sec: i64, quota: i64) -> Self {
        Self {
            timestamp_sec,
            window: [0; WINDOW_SECS],
            sum: 0,
            quota,
        }
    }

    /// Number of leading empty seconds, i.e. how long until the oldest
    /// counted request leaves the window. 60 when the window is empty.
    #[must_use]
    pub fn num_empty_slots_at_start(&self) -> usize {
        self.window
            .iter()
            .position(|&count| count != 0)
            .unwrap_or(WINDOW_SECS)
    }

    /// Whether the quota is used up.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.sum >= self.quota
    }

    /// Requests left after admitting one more.
    #[must_use]
    pub fn remaining_after_admit(&self) -> i64 {
        (self.quota - self.sum - 1).max(0)
    }
}

/// A per-key sliding window counter with quotas.
///
/// Implemented in process by [`LocalWindowCounter`](super::LocalWindowCounter)
/// and against the shared store by
/// [`DistributedWindowCounter`](super::DistributedWindowCounter).
#[async_trait]
pub trait WindowCounter: Send + Sync + std::fmt::Debug {
    /// Window ending at `timestamp_sec` for `key`.
    ///
    /// Fails with `QuotaNotFound` when no quota was set for the key.
    async fn fetch(&self, key: &str, timestamp_sec: i64) -> RateLimitResult<WindowSnapshot>;

    /// Count one request for `key` at `timestamp_sec`.
    async fn increment(&self, key: &str, timestamp_sec: i64) -> RateLimitResult<()>;

    /// Set the requests-per-minute quota for `key`.
    async fn set_quota(&self, key: &str, quota: i64) -> RateLimitResult<()>;

    /// Whether quotas live only in this process. Such a counter must be
    /// filled by every instance, not only by the lease holder.
    fn is_process_local(&self) -> bool {
        false
    }

    /// Set several quotas.
    async fn set_quotas(&self, quotas: &[(String, i64)]) -> RateLimitResult<()> {
        for (key, quota) in quotas {
            self.set_quota(key, *quota).await?;
        }
        Ok(())
    }
}
