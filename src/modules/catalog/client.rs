//! Control server client.

use super::error::ControlPlaneError;
use super::model::{Catalog, CatalogVersion};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Credential header sent to the control server.
pub const CONTROL_PLANE_KEY_HEADER: &str = "x-api-key";

/// Where catalogs come from.
#[async_trait]
pub trait CatalogSource: Send + Sync + std::fmt::Debug {
    /// Version stamp of the newest catalog.
    async fn latest_version(&self) -> Result<CatalogVersion, ControlPlaneError>;

    /// The newest full catalog.
    async fn fetch_catalog(&self) -> Result<Catalog, ControlPlaneError>;
}

/// Endpoints of the control server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogUrls {
    /// Version stamp of the newest catalog.
    pub latest_version: String,
    /// Diff between two versions. Not used yet.
    pub diff: String,
    /// Full indexed catalog.
    pub indexed_catalog: String,
}

impl CatalogUrls {
    /// Build the endpoint set from a base URL.
    #[must_use]
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            latest_version: format!("{base}/latest"),
            diff: format!("{base}/catalog_diff"),
            indexed_catalog: format!("{base}/indexed_limits"),
        }
    }
}

/// HTTP client for the control server.
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    urls: CatalogUrls,
}

impl ControlPlaneClient {
    /// Create a client authenticating with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ControlPlaneError> {
        let mut headers = HeaderMap::new();
        let mut value = HeaderValue::from_str(api_key)
            .map_err(|e| ControlPlaneError::Client(format!("invalid api key: {e}")))?;
        value.set_sensitive(true);
        headers.insert(HeaderName::from_static(CONTROL_PLANE_KEY_HEADER), value);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ControlPlaneError::Client(e.to_string()))?;

        Ok(Self {
            http,
            urls: CatalogUrls::from_base(base_url),
        })
    }

    /// Configured endpoints.
    #[must_use]
    pub fn urls(&self) -> &CatalogUrls {
        &self.urls
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ControlPlaneError> {
        let http_err = |source| ControlPlaneError::Http {
            url: url.to_string(),
            source,
        };

        let resp = self.http.get(url).send().await.map_err(http_err)?;
        if !resp.status().is_success() {
            return Err(ControlPlaneError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let body = resp.text().await.map_err(http_err)?;
        debug!(url, bytes = body.len(), "control plane response");
        serde_json::from_str(&body).map_err(|source| ControlPlaneError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl CatalogSource for ControlPlaneClient {
    async fn latest_version(&self) -> Result<CatalogVersion, ControlPlaneError> {
        self.get_json(&self.urls.latest_version).await
    }

    async fn fetch_catalog(&self) -> Result<Catalog, ControlPlaneError> {
        self.get_json(&self.urls.indexed_catalog).await
    }
}
