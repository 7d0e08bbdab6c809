//! Keeping the local routes and the shared quotas in line with the newest
//! catalog.

use super::client::CatalogSource;
use super::error::{CatalogError, CatalogResult};
use super::lease::{CatalogLease, LeaseRelease};
use super::model::{Catalog, CatalogVersion};
use super::publish::{publish_quotas, update_route_matcher, PublishReport};
use crate::modules::path_matcher::SharedRouteMatcher;
use crate::modules::rate_limiting::WindowCounter;
use std::future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Result of applying a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Routes updated and quotas written by this instance.
    Published(PublishReport),
    /// Routes updated; the shared store already holds this version's quotas.
    AlreadyPublished,
    /// Routes updated; a peer holds the publish lease.
    PublishSkipped,
    /// Nothing newer than what is already applied.
    Unchanged,
}

#[derive(Debug, Default)]
struct Applied {
    /// Catalog behind the live route table.
    routes: Option<CatalogVersion>,
    /// Catalog whose quotas are known to be in the counter.
    quotas: Option<CatalogVersion>,
}

/// Applies catalogs to the local matcher and, under the lease, to the shared
/// quota store.
#[derive(Debug)]
pub struct CatalogSync {
    matcher: Arc<SharedRouteMatcher>,
    counter: Arc<dyn WindowCounter>,
    lease: CatalogLease,
    applied: Mutex<Applied>,
}

impl CatalogSync {
    /// Create a sync over the given collaborators.
    pub fn new(
        matcher: Arc<SharedRouteMatcher>,
        counter: Arc<dyn WindowCounter>,
        lease: CatalogLease,
    ) -> Self {
        Self {
            matcher,
            counter,
            lease,
            applied: Mutex::new(Applied::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, Applied> {
        self.applied.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Version of the last catalog whose quotas are in place.
    #[must_use]
    pub fn applied_version(&self) -> Option<CatalogVersion> {
        self.state().quotas.clone()
    }

    /// Version of the catalog behind the live route table.
    #[must_use]
    pub fn routes_version(&self) -> Option<CatalogVersion> {
        self.state().routes.clone()
    }

    /// Whether `hash` is the catalog whose quotas are in place.
    #[must_use]
    pub fn is_current(&self, hash: &str) -> bool {
        self.state().quotas.as_ref().is_some_and(|v| v.hash == hash)
    }

    /// Whether the live routes belong to a catalog whose quotas were never
    /// confirmed.
    #[must_use]
    pub fn has_pending_publish(&self) -> bool {
        let state = self.state();
        match (&state.routes, &state.quotas) {
            (Some(routes), Some(quotas)) => routes.hash != quotas.hash,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// The publish lease.
    #[must_use]
    pub fn lease(&self) -> &CatalogLease {
        &self.lease
    }

    /// Validate and apply a catalog.
    ///
    /// An invalid catalog is rejected before anything changes. Otherwise
    /// the route matcher is always updated. A process-local counter is
    /// always filled. Shared quotas are written only when the store does
    /// not hold this version yet and this instance wins the lease.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog is invalid or the store fails. A
    /// failed publish leaves the lease marker to expire.
    pub async fn apply(&self, catalog: &Catalog) -> CatalogResult<SyncOutcome> {
        if let Err(e) = catalog.ensure_valid() {
            for violation in e.violations() {
                error!(%violation, "catalog violation");
            }
            return Err(e);
        }

        update_route_matcher(catalog, &self.matcher);
        self.state().routes = Some(catalog.version.clone());

        if self.counter.is_process_local() {
            return self.apply_local(catalog).await;
        }

        let status = self.lease.status().await?;
        if status.limits_version.as_deref() == Some(catalog.version.hash.as_str()) {
            debug!(hash = %catalog.version.hash, "quotas already published");
            self.record_quotas(&catalog.version);
            return Ok(SyncOutcome::AlreadyPublished);
        }

        let Some(lease) = self.lease.try_acquire().await? else {
            info!(
                version = %catalog.version.semver,
                "peer is publishing quotas, routes updated only"
            );
            return Ok(SyncOutcome::PublishSkipped);
        };

        let report = match publish_quotas(catalog, self.counter.as_ref()).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "quota publish failed, leaving lease to expire");
                return Err(CatalogError::Publish(e));
            },
        };

        let release = self
            .lease
            .finish(lease, &catalog.version.semver, &catalog.version.hash)
            .await?;
        if release == LeaseRelease::Expiring {
            warn!(version = %catalog.version.semver, "catalog published after lease deadline");
        }

        self.record_quotas(&catalog.version);
        Ok(SyncOutcome::Published(report))
    }

    /// Fill the in-process counter, then stamp the shared versions if the
    /// lease is free.
    async fn apply_local(&self, catalog: &Catalog) -> CatalogResult<SyncOutcome> {
        let report = publish_quotas(catalog, self.counter.as_ref())
            .await
            .map_err(CatalogError::Publish)?;
        self.record_quotas(&catalog.version);

        if let Err(e) = self.stamp_versions(&catalog.version).await {
            warn!(error = %e, "failed to record catalog version in the store");
        }
        Ok(SyncOutcome::Published(report))
    }

    async fn stamp_versions(&self, version: &CatalogVersion) -> CatalogResult<()> {
        match self.lease.try_acquire().await? {
            Some(lease) => {
                self.lease.finish(lease, &version.semver, &version.hash).await?;
            },
            None => debug!("peer holds the lease, leaving version stamps to it"),
        }
        Ok(())
    }

    fn record_quotas(&self, version: &CatalogVersion) {
        self.state().quotas = Some(version.clone());
    }
}

/// Poll intervals of the coordinator. A zero interval disables that timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    server_poll: Duration,
    store_poll: Duration,
    check_latest_version: bool,
}

impl CoordinatorSettings {
    /// Create settings. The store poll never runs less often than the server
    /// poll.
    #[must_use]
    pub fn new(server_poll: Duration, store_poll: Duration, check_latest_version: bool) -> Self {
        let store_poll = if !server_poll.is_zero() && server_poll < store_poll {
            server_poll
        } else {
            store_poll
        };
        Self {
            server_poll,
            store_poll,
            check_latest_version,
        }
    }

    /// Control server poll interval.
    #[must_use]
    pub fn server_poll(&self) -> Duration {
        self.server_poll
    }

    /// Shared store poll interval.
    #[must_use]
    pub fn store_poll(&self) -> Duration {
        self.store_poll
    }

    /// Whether timer driven fetches ask for the latest version first.
    #[must_use]
    pub fn check_latest_version(&self) -> bool {
        self.check_latest_version
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(3), true)
    }
}

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTrigger {
    /// Control server timer.
    ServerPoll,
    /// Shared store timer.
    StorePoll,
    /// Explicit request through the handle.
    OnDemand,
}

/// Background task keeping catalogs current.
#[derive(Debug)]
pub struct CatalogUpdateCoordinator {
    source: Arc<dyn CatalogSource>,
    sync: Arc<CatalogSync>,
    settings: CoordinatorSettings,
}

impl CatalogUpdateCoordinator {
    /// Create a coordinator.
    pub fn new(
        source: Arc<dyn CatalogSource>,
        sync: Arc<CatalogSync>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            source,
            sync,
            settings,
        }
    }

    /// Run one cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the control server, the store or the catalog
    /// itself fails. The caller retries on the next trigger.
    pub async fn run_cycle(&self, trigger: UpdateTrigger) -> CatalogResult<SyncOutcome> {
        match trigger {
            UpdateTrigger::ServerPoll if self.settings.check_latest_version => {
                let latest = self.source.latest_version().await?;
                if self.sync.is_current(&latest.hash) {
                    debug!(hash = %latest.hash, "catalog up to date");
                    return Ok(SyncOutcome::Unchanged);
                }
            },
            UpdateTrigger::StorePoll => {
                let status = self.sync.lease().status().await?;
                if status.updating {
                    debug!("peer update in progress");
                    return Ok(SyncOutcome::Unchanged);
                }
                match status.limits_version.as_deref() {
                    Some(hash) if self.sync.is_current(hash) && !self.sync.has_pending_publish() => {
                        return Ok(SyncOutcome::Unchanged);
                    },
                    Some(hash) => info!(%hash, "shared limits differ from local state, refetching"),
                    None => info!("no limits published yet, refetching"),
                }
            },
            UpdateTrigger::ServerPoll | UpdateTrigger::OnDemand => {},
        }

        let catalog = self.source.fetch_catalog().await?;
        self.sync.apply(&catalog).await
    }

    async fn run_logged(&self, trigger: UpdateTrigger) {
        match self.run_cycle(trigger).await {
            Ok(SyncOutcome::Unchanged) => {},
            Ok(outcome) => info!(?trigger, ?outcome, "catalog cycle complete"),
            Err(e) if e.is_recoverable() => warn!(?trigger, error = %e, "catalog cycle failed"),
            Err(e) => error!(?trigger, error = %e, "catalog cycle aborted"),
        }
    }

    /// Start the coordinator on the current runtime.
    pub fn spawn(self) -> CoordinatorHandle {
        let (update_tx, update_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run(update_rx, shutdown_rx));
        CoordinatorHandle {
            update_tx,
            shutdown_tx,
            task,
        }
    }

    async fn run(self, mut updates: mpsc::Receiver<()>, mut shutdown: mpsc::Receiver<()>) {
        info!(
            server_poll = ?self.settings.server_poll,
            store_poll = ?self.settings.store_poll,
            "catalog coordinator started"
        );

        let mut server_timer = poll_timer(self.settings.server_poll);
        let mut store_timer = poll_timer(self.settings.store_poll);

        loop {
            let trigger = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = tick(&mut store_timer) => UpdateTrigger::StorePoll,
                Some(()) = updates.recv() => UpdateTrigger::OnDemand,
                _ = tick(&mut server_timer) => UpdateTrigger::ServerPoll,
            };
            self.run_logged(trigger).await;
        }

        info!("catalog coordinator stopped");
    }
}

fn poll_timer(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(timer)
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        },
        None => future::pending().await,
    }
}

/// Control handle of a running coordinator.
#[derive(Debug)]
pub struct CoordinatorHandle {
    update_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    /// Ask for a full fetch. Returns `false` if one is already pending or
    /// the coordinator has stopped.
    pub fn request_update(&self) -> bool {
        self.update_tx.try_send(()).is_ok()
    }

    /// Whether the background task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the coordinator after its current cycle and wait for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "catalog coordinator task failed");
        }
    }
}
