//! Structural validation of catalogs.

use super::error::{CatalogError, CatalogResult};
use super::model::Catalog;
use std::fmt;

/// A dangling index in a catalog, with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogViolation {
    /// `endpoints[endpoint].p` is out of range.
    PathIndex {
        /// Endpoint position.
        endpoint: usize,
        /// Offending index.
        index: i64,
        /// Number of paths.
        len: usize,
    },

    /// `endpoints[endpoint].m` is out of range.
    MethodIndex {
        /// Endpoint position.
        endpoint: usize,
        /// Offending index.
        index: i64,
        /// Number of methods.
        len: usize,
    },

    /// `apilimits[api_limit].limits[limit].ep` is out of range.
    EndpointIndex {
        /// API key position.
        api_limit: usize,
        /// Limit position within the API key.
        limit: usize,
        /// Offending index.
        index: i64,
        /// Number of endpoints.
        len: usize,
    },
}

impl fmt::Display for CatalogViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathIndex {
                endpoint,
                index,
                len,
            } => write!(f, "endpoint {endpoint}: path index {index} out of range (0..{len})"),
            Self::MethodIndex {
                endpoint,
                index,
                len,
            } => write!(f, "endpoint {endpoint}: method index {index} out of range (0..{len})"),
            Self::EndpointIndex {
                api_limit,
                limit,
                index,
                len,
            } => write!(
                f,
                "api limit {api_limit}, limit {limit}: endpoint index {index} out of range (0..{len})"
            ),
        }
    }
}

fn in_range(index: i64, len: usize) -> bool {
    usize::try_from(index).is_ok_and(|i| i < len)
}

impl Catalog {
    /// Every dangling index in the catalog, in document order.
    #[must_use]
    pub fn validate(&self) -> Vec<CatalogViolation> {
        let mut violations = Vec::new();

        for (endpoint, ep) in self.endpoints.iter().enumerate() {
            if !in_range(ep.path_idx, self.paths.len()) {
                violations.push(CatalogViolation::PathIndex {
                    endpoint,
                    index: ep.path_idx,
                    len: self.paths.len(),
                });
            }
            if !in_range(ep.method_idx, self.methods.len()) {
                violations.push(CatalogViolation::MethodIndex {
                    endpoint,
                    index: ep.method_idx,
                    len: self.methods.len(),
                });
            }
        }

        for (api_limit, key_limits) in self.api_limits.iter().enumerate() {
            for (limit, lim) in key_limits.limits.iter().enumerate() {
                if !in_range(lim.endpoint_idx, self.endpoints.len()) {
                    violations.push(CatalogViolation::EndpointIndex {
                        api_limit,
                        limit,
                        index: lim.endpoint_idx,
                        len: self.endpoints.len(),
                    });
                }
            }
        }

        violations
    }

    /// Fail with every violation if the catalog is invalid.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Invalid`] listing all violations.
    pub fn ensure_valid(&self) -> CatalogResult<()> {
        let violations = self.validate();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(CatalogError::Invalid(violations))
        }
    }
}
