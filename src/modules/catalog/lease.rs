//! Best-effort publish lease in the shared store.
//!
//! Only the instance holding the lease writes quotas for a catalog round.
//! The lease is a marker key with an expiry: an instance that dies mid
//! publish leaves the marker to time out.

use crate::clock::Clock;
use crate::store::{KeyLayout, KeyValueStore, StoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifetime of the updating marker.
pub const LEASE_TTL_SECS: u64 = 300;

/// Margin before expiry after which a finishing holder no longer touches the
/// marker.
pub const LEASE_SAFETY_MARGIN_SECS: i64 = 5;

/// A lease held by this instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredLease {
    /// Unix time the lease was taken.
    pub started_at: i64,
}

/// How a lease was given up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseRelease {
    /// Versions were recorded and the marker removed.
    Released,
    /// Too close to expiry; the marker is left to time out.
    Expiring,
}

/// Catalog coordination keys as read from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogStatus {
    /// Content hash of the last published limits.
    pub limits_version: Option<String>,
    /// Semantic version of the last published catalog.
    pub catalog_version: Option<String>,
    /// Start of the most recent update.
    pub update_started: Option<DateTime<Utc>>,
    /// End of the most recent completed update.
    pub update_finished: Option<DateTime<Utc>>,
    /// Whether some instance currently holds the lease.
    pub updating: bool,
}

fn parse_unix(key: &str, raw: Option<&String>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match raw.parse::<i64>().ok().and_then(|secs| DateTime::from_timestamp(secs, 0)) {
        Some(ts) => Some(ts),
        None => {
            warn!(key, value = %raw, "ignoring malformed timestamp");
            None
        },
    }
}

/// Publish lease over a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct CatalogLease {
    store: Arc<dyn KeyValueStore>,
    keys: KeyLayout,
    clock: Arc<dyn Clock>,
}

impl CatalogLease {
    /// Create a lease handle.
    pub fn new(store: Arc<dyn KeyValueStore>, keys: KeyLayout, clock: Arc<dyn Clock>) -> Self {
        Self { store, keys, clock }
    }

    /// Take the lease unless a peer holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn try_acquire(&self) -> StoreResult<Option<AcquiredLease>> {
        let started_at = self.clock.now_secs();
        let stamp = DateTime::from_timestamp(started_at, 0)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let acquired = self
            .store
            .set_if_absent(&self.keys.updating_key(), &stamp, LEASE_TTL_SECS)
            .await?;
        if !acquired {
            debug!("catalog update lease held by a peer");
            return Ok(None);
        }

        self.store
            .set(&self.keys.update_started_key(), &started_at.to_string())
            .await?;
        debug!(started_at, "catalog update lease acquired");
        Ok(Some(AcquiredLease { started_at }))
    }

    /// Record the published versions and give the lease up.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn finish(
        &self,
        lease: AcquiredLease,
        catalog_version: &str,
        limits_version: &str,
    ) -> StoreResult<LeaseRelease> {
        let now = self.clock.now_secs();
        let elapsed = now - lease.started_at;
        let ttl = i64::try_from(LEASE_TTL_SECS).unwrap_or(i64::MAX);
        if elapsed > ttl - LEASE_SAFETY_MARGIN_SECS {
            warn!(elapsed, "catalog update ran past the lease, leaving marker to expire");
            return Ok(LeaseRelease::Expiring);
        }

        let sets = [
            (self.keys.update_finished_key(), now.to_string()),
            (self.keys.catalog_version_key(), catalog_version.to_string()),
            (self.keys.limits_version_key(), limits_version.to_string()),
        ];
        self.store
            .apply_atomically(&sets, &[self.keys.updating_key()])
            .await?;
        Ok(LeaseRelease::Released)
    }

    /// Read the coordination keys.
    ///
    /// Timestamps that fail to parse are reported as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn status(&self) -> StoreResult<CatalogStatus> {
        let keys = [
            self.keys.limits_version_key(),
            self.keys.catalog_version_key(),
            self.keys.update_started_key(),
            self.keys.update_finished_key(),
            self.keys.updating_key(),
        ];
        let values = self.store.get_many(&keys).await?;
        let value = |i: usize| values.get(i).cloned().flatten();

        Ok(CatalogStatus {
            limits_version: value(0),
            catalog_version: value(1),
            update_started: parse_unix(&keys[2], value(2).as_ref()),
            update_finished: parse_unix(&keys[3], value(3).as_ref()),
            updating: value(4).is_some(),
        })
    }
}
