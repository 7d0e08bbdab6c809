//! Error types for catalog handling.

use super::validation::CatalogViolation;
use crate::modules::rate_limiting::RateLimitError;
use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors that can occur while loading or applying a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog references entries that do not exist.
    #[error("invalid catalog: {} violation(s)", .0.len())]
    Invalid(Vec<CatalogViolation>),

    /// The catalog file could not be read.
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        /// Catalog file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The catalog document is not valid JSON for the schema.
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    /// Shared store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Quota publishing failed.
    #[error("quota publish failed: {0}")]
    Publish(#[from] RateLimitError),

    /// The control server could not provide a catalog.
    #[error("control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),
}

impl CatalogError {
    /// Check if retrying on the next cycle may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_recoverable(),
            Self::Publish(e) => e.is_recoverable(),
            Self::ControlPlane(e) => e.is_recoverable(),
            Self::Invalid(_) | Self::Io { .. } | Self::Parse(_) => false,
        }
    }

    /// Violations of an invalid catalog, empty for other errors.
    #[must_use]
    pub fn violations(&self) -> &[CatalogViolation] {
        match self {
            Self::Invalid(violations) => violations,
            _ => &[],
        }
    }
}

/// Errors talking to the catalog control server.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// The request could not be sent or the body not read.
    #[error("request to {url} failed: {source}")]
    Http {
        /// Requested URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned status {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The response body is not the expected document.
    #[error("invalid response from {url}: {source}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The HTTP client could not be built.
    #[error("invalid control plane client: {0}")]
    Client(String),
}

impl ControlPlaneError {
    /// Check if the error may go away on retry.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Decode { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Client(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CatalogError::Invalid(vec![CatalogViolation::PathIndex {
            endpoint: 0,
            index: 5,
            len: 1,
        }]);
        assert_eq!(err.to_string(), "invalid catalog: 1 violation(s)");
        assert_eq!(err.violations().len(), 1);

        let err = ControlPlaneError::Status {
            url: "http://cp/indexed_limits".to_string(),
            status: 401,
        };
        assert_eq!(err.to_string(), "http://cp/indexed_limits returned status 401");
    }

    #[test]
    fn test_is_recoverable() {
        let unauthorized = ControlPlaneError::Status {
            url: String::new(),
            status: 401,
        };
        assert!(!unauthorized.is_recoverable());

        let unavailable = ControlPlaneError::Status {
            url: String::new(),
            status: 503,
        };
        assert!(CatalogError::from(unavailable).is_recoverable());
        assert!(!CatalogError::Invalid(Vec::new()).is_recoverable());
        assert!(CatalogError::Store(StoreError::Timeout("get".to_string())).is_recoverable());
    }
}
