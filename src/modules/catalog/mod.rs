//! # Catalog Module
//!
//! Versioned rate limit policy and its distribution across the fleet.
//!
//! ## Features
//!
//! - **Indexed catalog model**: methods, templated paths, endpoints and per
//!   API key quotas, loaded from JSON ([`Catalog`])
//! - **Validation**: every dangling index reported with its position
//!   ([`CatalogViolation`])
//! - **Publishing**: route matcher refresh on every instance, shared quota
//!   upload under a store lease by exactly one, once per version; in-process
//!   counters are filled everywhere ([`CatalogSync`], [`CatalogLease`])
//! - **Background updates**: control server and shared store polling plus
//!   on-demand refresh ([`CatalogUpdateCoordinator`])
//!
//! ## Usage
//!
//! ```ignore
//! let sync = Arc::new(CatalogSync::new(matcher, counter, lease));
//! sync.apply(&Catalog::from_file("catalog.json")?).await?;
//!
//! let client = ControlPlaneClient::new(url, api_key, Duration::from_secs(5))?;
//! let handle = CatalogUpdateCoordinator::new(Arc::new(client), sync, settings).spawn();
//! handle.request_update();
//! ```

mod client;
mod coordinator;
mod error;
mod lease;
mod model;
mod publish;
mod validation;

pub use client::{CatalogSource, CatalogUrls, ControlPlaneClient, CONTROL_PLANE_KEY_HEADER};
pub use coordinator::{
    CatalogSync, CatalogUpdateCoordinator, CoordinatorHandle, CoordinatorSettings, SyncOutcome,
    UpdateTrigger,
};
pub use error::{CatalogError, CatalogResult, ControlPlaneError};
pub use lease::{
    AcquiredLease, CatalogLease, CatalogStatus, LeaseRelease, LEASE_SAFETY_MARGIN_SECS,
    LEASE_TTL_SECS,
};
pub use model::{ApiKeyLimits, Catalog, CatalogVersion, Endpoint, EndpointLimit};
pub use publish::{collect_quotas, publish_quotas, quota_bucket, update_route_matcher, PublishReport};
pub use validation::CatalogViolation;
