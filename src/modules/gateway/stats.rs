//! Gateway counters.

use crate::modules::rate_limiting::Decision;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for the gateway.
#[derive(Debug, Default)]
pub struct GatewayStats {
    /// Requests evaluated.
    pub checked: AtomicU64,
    /// Requests forwarded to the upstream.
    pub allowed: AtomicU64,
    /// Requests rejected.
    pub denied: AtomicU64,
    /// Requests forwarded because the counter failed.
    pub failed_open: AtomicU64,
    /// Forwarded requests the upstream did not answer.
    pub upstream_errors: AtomicU64,
}

/// Point-in-time copy of [`GatewayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Requests evaluated.
    pub checked: u64,
    /// Requests forwarded.
    pub allowed: u64,
    /// Requests rejected.
    pub denied: u64,
    /// Requests forwarded after a counter failure.
    pub failed_open: u64,
    /// Upstream failures.
    pub upstream_errors: u64,
}

impl GatewayStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decision.
    pub fn record(&self, decision: &Decision) {
        self.checked.fetch_add(1, Ordering::Relaxed);
        if !decision.forwards() {
            self.denied.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.allowed.fetch_add(1, Ordering::Relaxed);
        if matches!(decision, Decision::FailedOpen { .. }) {
            self.failed_open.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an upstream failure.
    pub fn record_upstream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            checked: self.checked.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            failed_open: self.failed_open.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record() {
        let stats = GatewayStats::new();
        stats.record(&Decision::PassThrough);
        stats.record(&Decision::MissingApiKey);
        stats.record(&Decision::FailedOpen {
            bucket: "K_GET_/a".to_string(),
        });
        stats.record_upstream_error();

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                checked: 3,
                allowed: 2,
                denied: 1,
                failed_open: 1,
                upstream_errors: 1,
            }
        );
    }
}
