//! Wiring of the gateway components from configuration.

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, CounterBackend, GatewayConfig};
use crate::modules::catalog::{
    Catalog, CatalogError, CatalogLease, CatalogSync, CatalogUpdateCoordinator,
    ControlPlaneClient, CoordinatorHandle, SyncOutcome,
};
use crate::modules::gateway::{GatewayError, GatewayServer, GatewayStats, Upstream};
use crate::modules::path_matcher::SharedRouteMatcher;
use crate::modules::rate_limiting::{
    ApiKeyCatalog, DefaultApiKeys, DistributedWindowCounter, LocalWindowCounter,
    RateLimitEvaluator, StoreApiKeys, WindowCounter,
};
use crate::store::{create_store, KeyValueStore, StoreError};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors that stop the gateway from starting.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The store could not be reached.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The startup catalog could not be applied.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The listener or upstream could not be set up.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// A fully wired gateway.
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    store: Arc<dyn KeyValueStore>,
    matcher: Arc<SharedRouteMatcher>,
    counter: Arc<dyn WindowCounter>,
    sync: Arc<CatalogSync>,
    server: GatewayServer,
    coordinator: Option<CoordinatorHandle>,
}

impl Gateway {
    /// Build the gateway on the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached or the configuration
    /// is unusable.
    pub async fn build(config: GatewayConfig) -> RuntimeResult<Self> {
        Self::build_with_clock(config, Arc::new(SystemClock)).await
    }

    /// Build the gateway on the given clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached or the configuration
    /// is unusable.
    pub async fn build_with_clock(
        config: GatewayConfig,
        clock: Arc<dyn Clock>,
    ) -> RuntimeResult<Self> {
        let store = create_store(&config.store, Arc::clone(&clock)).await?;
        let keys = config.store.keys.clone();
        let matcher = Arc::new(SharedRouteMatcher::new());

        let counter: Arc<dyn WindowCounter> = match config.gateway.counter {
            CounterBackend::Distributed => {
                Arc::new(DistributedWindowCounter::new(Arc::clone(&store), keys.clone()))
            },
            CounterBackend::Local => Arc::new(LocalWindowCounter::new()),
        };

        let api_keys: Arc<dyn ApiKeyCatalog> = if config.gateway.key_blocking {
            Arc::new(StoreApiKeys::new(
                Arc::clone(&store),
                keys.clone(),
                Arc::clone(&clock),
            ))
        } else {
            Arc::new(DefaultApiKeys)
        };

        let evaluator = Arc::new(RateLimitEvaluator::new(
            Arc::clone(&matcher),
            Arc::clone(&counter),
            api_keys,
            Arc::clone(&clock),
            config.gateway.evaluator_settings()?,
        ));

        let lease = CatalogLease::new(Arc::clone(&store), keys, clock);
        let sync = Arc::new(CatalogSync::new(
            Arc::clone(&matcher),
            Arc::clone(&counter),
            lease,
        ));

        let upstream = Upstream::new(
            &config.gateway.upstream,
            config.gateway.upstream_connect_timeout(),
        )?;
        let server = GatewayServer::new(config.gateway.listen, evaluator, upstream);

        Ok(Self {
            config,
            store,
            matcher,
            counter,
            sync,
            server,
            coordinator: None,
        })
    }

    /// Apply the configured catalog file, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or invalid, or the store
    /// fails while publishing.
    pub async fn apply_catalog_file(&self) -> RuntimeResult<Option<SyncOutcome>> {
        let Some(path) = &self.config.catalog.file else {
            return Ok(None);
        };
        let catalog = Catalog::from_file(path)?;
        info!(
            path = %path.display(),
            version = %catalog.version.semver,
            endpoints = catalog.endpoints.len(),
            "applying startup catalog"
        );
        Ok(Some(self.sync.apply(&catalog).await?))
    }

    /// Apply the startup catalog, start the listener and, when a control
    /// server is configured, the background coordinator.
    ///
    /// # Errors
    ///
    /// Returns an error if the startup catalog is rejected or the listener
    /// cannot be bound.
    pub async fn start(&mut self) -> RuntimeResult<SocketAddr> {
        self.apply_catalog_file().await?;
        let addr = self.server.start().await?;

        if let Some(url) = &self.config.catalog.server_url {
            let client = ControlPlaneClient::new(
                url,
                &self.config.catalog.server_api_key,
                self.config.catalog.request_timeout(),
            )
            .map_err(CatalogError::from)?;
            let coordinator = CatalogUpdateCoordinator::new(
                Arc::new(client),
                Arc::clone(&self.sync),
                self.config.catalog.coordinator_settings(),
            );
            self.coordinator = Some(coordinator.spawn());
        }

        Ok(addr)
    }

    /// Ask the coordinator for a full catalog fetch.
    pub fn request_catalog_update(&self) -> bool {
        self.coordinator
            .as_ref()
            .is_some_and(CoordinatorHandle::request_update)
    }

    /// Stop the coordinator and the listener.
    pub async fn shutdown(mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            coordinator.shutdown().await;
        }
        if self.server.is_running() {
            let _ = self.server.stop().await;
        }
        info!("gateway stopped");
    }

    /// The shared route matcher.
    #[must_use]
    pub fn matcher(&self) -> &Arc<SharedRouteMatcher> {
        &self.matcher
    }

    /// The window counter.
    #[must_use]
    pub fn counter(&self) -> &Arc<dyn WindowCounter> {
        &self.counter
    }

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Catalog application state.
    #[must_use]
    pub fn sync(&self) -> &Arc<CatalogSync> {
        &self.sync
    }

    /// Request counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<GatewayStats> {
        self.server.stats()
    }

    /// Bound listener address while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }
}
