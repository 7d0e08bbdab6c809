//! In-process sliding window counters.

use super::error::{RateLimitError, RateLimitResult};
use super::window::{WindowCounter, WindowSnapshot, WINDOW_SECS};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

const WINDOW: i64 = WINDOW_SECS as i64;

/// Ring buffer of per-second counts over the trailing minute.
///
/// `window[(ring_start_idx + j) % 60]` holds the count for second
/// `head_timestamp_sec - 59 + j`, so the oldest second sits at
/// `ring_start_idx` and the head second right before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalWindow {
    head_timestamp_sec: i64,
    ring_start_idx: usize,
    window: [i64; WINDOW_SECS],
    sum: i64,
    quota: Option<i64>,
}

impl Default for LocalWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalWindow {
    /// Create an empty window without a quota.
    #[must_use]
    pub fn new() -> Self {
        Self {
            head_timestamp_sec: 0,
            ring_start_idx: 0,
            window: [0; WINDOW_SECS],
            sum: 0,
            quota: None,
        }
    }

    /// Create an empty window with a quota.
    #[must_use]
    pub fn with_quota(quota: i64) -> Self {
        Self {
            quota: Some(quota),
            ..Self::new()
        }
    }

    /// Requests allowed per minute, if set.
    #[must_use]
    pub fn quota(&self) -> Option<i64> {
        self.quota
    }

    /// Set the requests-per-minute quota.
    pub fn set_quota(&mut self, quota: i64) {
        self.quota = Some(quota);
    }

    /// Total requests in the window ending at the head second.
    #[must_use]
    pub fn sum(&self) -> i64 {
        self.sum
    }

    /// Most recent second seen.
    #[must_use]
    pub fn head_timestamp_sec(&self) -> i64 {
        self.head_timestamp_sec
    }

    /// Count one request at `timestamp_sec`.
    ///
    /// A later second moves the head forward and evicts the seconds that
    /// fall out of the window. An earlier second still inside the window is
    /// counted retroactively; anything older is ignored.
    pub fn increment(&mut self, timestamp_sec: i64) {
        let mut advance = timestamp_sec - self.head_timestamp_sec;
        if advance < -(WINDOW - 1) {
            return;
        }

        let mut back_secs = 0;
        if advance > 0 {
            self.head_timestamp_sec = timestamp_sec;
            if advance >= WINDOW {
                advance = WINDOW;
                self.ring_start_idx = 0;
            }
            for i in 0..advance as usize {
                let idx = (self.ring_start_idx + i) % WINDOW_SECS;
                self.sum -= self.window[idx];
                self.window[idx] = 0;
            }
            self.ring_start_idx = (self.ring_start_idx + advance as usize) % WINDOW_SECS;
        } else {
            back_secs = advance;
        }

        // ring_start_idx + 59 is the head second; back_secs is in -59..=0.
        let idx = (WINDOW + self.ring_start_idx as i64 + (WINDOW - 1) + back_secs) % WINDOW;
        self.window[idx as usize] += 1;
        self.sum += 1;
    }

    /// Window ending at `timestamp_sec`, without modifying the counter.
    ///
    /// Seconds covered by both this counter and the requested window are
    /// copied over; the rest is zero.
    #[must_use]
    pub fn snapshot(&self, timestamp_sec: i64) -> WindowSnapshot {
        let mut snapshot = WindowSnapshot::empty(timestamp_sec, self.quota.unwrap_or(0));
        if self.sum == 0 {
            return snapshot;
        }

        let shift = timestamp_sec - self.head_timestamp_sec;
        for offset in 0..WINDOW {
            let slot = offset - shift;
            if !(0..WINDOW).contains(&slot) {
                continue;
            }
            let count = self.window[(self.ring_start_idx + offset as usize) % WINDOW_SECS];
            snapshot.window[slot as usize] = count;
            snapshot.sum += count;
        }
        snapshot
    }

    /// Number of empty seconds at the start of the window, in ring order.
    #[must_use]
    pub fn num_empty_slots_at_start(&self) -> usize {
        (0..WINDOW_SECS)
            .find(|offset| self.window[(self.ring_start_idx + offset) % WINDOW_SECS] != 0)
            .unwrap_or(WINDOW_SECS)
    }
}

/// Process-local counters keyed by bucket.
///
/// Each key has its own lock; the key map is only write-locked to insert a
/// new key.
#[derive(Debug, Default)]
pub struct LocalWindowCounter {
    windows: RwLock<HashMap<String, Arc<Mutex<LocalWindow>>>>,
}

impl LocalWindowCounter {
    /// Create an empty counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn window(&self, key: &str) -> Option<Arc<Mutex<LocalWindow>>> {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn window_or_insert(&self, key: &str) -> Arc<Mutex<LocalWindow>> {
        if let Some(window) = self.window(key) {
            return window;
        }
        self.windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Count one request for `key`, creating its window on first use.
    pub fn record(&self, key: &str, timestamp_sec: i64) {
        let window = self.window_or_insert(key);
        let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
        window.increment(timestamp_sec);
    }

    /// Window for `key` ending at `timestamp_sec`, `None` for an unknown key.
    #[must_use]
    pub fn snapshot(&self, key: &str, timestamp_sec: i64) -> Option<WindowSnapshot> {
        let window = self.window(key)?;
        let window = window.lock().unwrap_or_else(PoisonError::into_inner);
        Some(window.snapshot(timestamp_sec))
    }

    /// Set the quota for `key`, creating its window if needed.
    pub fn update_quota(&self, key: &str, quota: i64) {
        let window = self.window_or_insert(key);
        window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_quota(quota);
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl WindowCounter for LocalWindowCounter {
    async fn fetch(&self, key: &str, timestamp_sec: i64) -> RateLimitResult<WindowSnapshot> {
        let window = self
            .window(key)
            .ok_or_else(|| RateLimitError::QuotaNotFound(key.to_string()))?;
        let window = window.lock().unwrap_or_else(PoisonError::into_inner);
        if window.quota().is_none() {
            return Err(RateLimitError::QuotaNotFound(key.to_string()));
        }
        Ok(window.snapshot(timestamp_sec))
    }

    async fn increment(&self, key: &str, timestamp_sec: i64) -> RateLimitResult<()> {
        self.record(key, timestamp_sec);
        Ok(())
    }

    async fn set_quota(&self, key: &str, quota: i64) -> RateLimitResult<()> {
        self.update_quota(key, quota);
        Ok(())
    }

    fn is_process_local(&self) -> bool {
        true
    }
}
