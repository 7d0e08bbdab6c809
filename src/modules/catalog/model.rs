//! Catalog document model.

use super::error::{CatalogError, CatalogResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Version stamp of a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogVersion {
    /// Human readable semantic version.
    #[serde(default)]
    pub semver: String,

    /// Content hash, changes whenever the limits change.
    #[serde(default)]
    pub hash: String,

    /// Release time.
    #[serde(default)]
    pub released: DateTime<Utc>,
}

/// A route: indices into [`Catalog::paths`] and [`Catalog::methods`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Index into `paths`.
    #[serde(rename = "p")]
    pub path_idx: i64,

    /// Index into `methods`.
    #[serde(rename = "m")]
    pub method_idx: i64,
}

/// Quota of one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointLimit {
    /// Index into `endpoints`.
    #[serde(rename = "ep")]
    pub endpoint_idx: i64,

    /// Requests per minute.
    #[serde(rename = "rl")]
    pub rate_limit: i64,
}

/// Quotas of one API key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyLimits {
    /// The API key.
    #[serde(rename = "key")]
    pub api_key: String,

    /// Per endpoint quotas.
    #[serde(default)]
    pub limits: Vec<EndpointLimit>,
}

/// Versioned rate limit policy.
///
/// Strings are stored once and referenced by index. A catalog is never
/// modified after it is loaded; a newer one replaces it as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Version stamp.
    #[serde(default)]
    pub version: CatalogVersion,

    /// HTTP methods.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Templated paths, e.g. `/users/{id}`.
    #[serde(default)]
    pub paths: Vec<String>,

    /// Method and path pairs.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,

    /// Per API key quotas.
    #[serde(default, rename = "apilimits")]
    pub api_limits: Vec<ApiKeyLimits>,
}

fn lookup(items: &[String], idx: i64) -> Option<&str> {
    usize::try_from(idx)
        .ok()
        .and_then(|i| items.get(i))
        .map(String::as_str)
}

impl Catalog {
    /// Parse a catalog from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not match the schema. Index
    /// ranges are not checked; see [`Catalog::validate`].
    pub fn from_json(json: &str) -> CatalogResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the catalog to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CatalogResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Load and validate a catalog file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// catalog is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json(&json)?;
        catalog.ensure_valid()?;
        Ok(catalog)
    }

    /// Method and templated path of an endpoint, `None` when any index is
    /// out of range.
    #[must_use]
    pub fn resolve_endpoint(&self, endpoint: &Endpoint) -> Option<(&str, &str)> {
        let method = lookup(&self.methods, endpoint.method_idx)?;
        let path = lookup(&self.paths, endpoint.path_idx)?;
        Some((method, path))
    }

    /// Endpoint at `idx`, resolved to method and path.
    #[must_use]
    pub fn resolve_endpoint_idx(&self, idx: i64) -> Option<(&str, &str)> {
        let endpoint = usize::try_from(idx).ok().and_then(|i| self.endpoints.get(i))?;
        self.resolve_endpoint(endpoint)
    }

    /// Number of quota entries over all API keys.
    #[must_use]
    pub fn limit_count(&self) -> usize {
        self.api_limits.iter().map(|a| a.limits.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "version": {"semver": "v1.2.0", "hash": "abc123", "released": "2024-03-01T10:00:00Z"},
        "methods": ["get", "POST"],
        "paths": ["/a/{id}", "/b"],
        "endpoints": [{"p": 0, "m": 0}, {"p": 1, "m": 1}],
        "apilimits": [{"key": "K", "limits": [{"ep": 0, "rl": 5}, {"ep": 1, "rl": 10}]}]
    }"#;

    #[test]
    fn test_parse_sample() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        assert_eq!(catalog.version.semver, "v1.2.0");
        assert_eq!(catalog.version.hash, "abc123");
        assert_eq!(catalog.endpoints[1], Endpoint { path_idx: 1, method_idx: 1 });
        assert_eq!(catalog.api_limits[0].limits[0].rate_limit, 5);
        assert_eq!(catalog.limit_count(), 2);
    }

    #[test]
    fn test_json_round_trip() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let json = catalog.to_json().unwrap();
        assert!(json.contains("\"apilimits\""));
        assert!(json.contains("\"ep\":0"));
        assert_eq!(Catalog::from_json(&json).unwrap(), catalog);
    }

    #[test]
    fn test_negative_indices_parse() {
        let catalog = Catalog::from_json(r#"{"endpoints": [{"p": -1, "m": 0}]}"#).unwrap();
        assert_eq!(catalog.endpoints[0].path_idx, -1);
        assert_eq!(catalog.resolve_endpoint(&catalog.endpoints[0]), None);
    }

    #[test]
    fn test_resolve_endpoint() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        assert_eq!(catalog.resolve_endpoint_idx(0), Some(("get", "/a/{id}")));
        assert_eq!(catalog.resolve_endpoint_idx(2), None);
        assert_eq!(catalog.resolve_endpoint_idx(-1), None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, SAMPLE.as_bytes()).unwrap();
        let catalog = Catalog::from_file(file.path()).unwrap();
        assert_eq!(catalog.paths.len(), 2);

        let err = Catalog::from_file("/nonexistent/catalog.json").unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"{"methods": ["GET"], "paths": ["/a"], "endpoints": [{"p": 5, "m": 0}]}"#,
        )
        .unwrap();
        let err = Catalog::from_file(file.path()).unwrap_err();
        assert_eq!(err.violations().len(), 1);
    }
}
