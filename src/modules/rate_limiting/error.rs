//! Error types for rate limiting.

use crate::store::StoreError;
use thiserror::Error;

/// Result type for rate limiting operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors that can occur during rate limiting.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// No quota was ever published for the bucket.
    #[error("no quota for bucket: {0}")]
    QuotaNotFound(String),

    /// The stored quota record is not an integer.
    #[error("invalid quota for {key}: {value:?}")]
    InvalidQuota {
        /// Bucket key.
        key: String,
        /// Raw stored value.
        value: String,
    },

    /// Shared store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Operation exceeded the request deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),
}

impl RateLimitError {
    /// Check if the error is recoverable.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Store(e) => e.is_recoverable(),
            Self::QuotaNotFound(_) | Self::InvalidQuota { .. } => false,
        }
    }

    /// Check if the error means no policy exists for the bucket.
    #[must_use]
    pub fn is_missing_policy(&self) -> bool {
        matches!(self, Self::QuotaNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RateLimitError::QuotaNotFound("K_GET_/a".to_string());
        assert_eq!(err.to_string(), "no quota for bucket: K_GET_/a");

        let err = RateLimitError::InvalidQuota {
            key: "K_GET_/a".to_string(),
            value: "ten".to_string(),
        };
        assert_eq!(err.to_string(), "invalid quota for K_GET_/a: \"ten\"");

        let err = RateLimitError::Timeout("fetch".to_string());
        assert_eq!(err.to_string(), "operation timed out: fetch");
    }

    #[test]
    fn test_is_recoverable() {
        assert!(RateLimitError::Timeout("t".to_string()).is_recoverable());
        assert!(RateLimitError::Store(StoreError::Unavailable("down".to_string())).is_recoverable());
        assert!(!RateLimitError::Store(StoreError::Data("bad".to_string())).is_recoverable());
        assert!(!RateLimitError::QuotaNotFound("k".to_string()).is_recoverable());
    }

    #[test]
    fn test_is_missing_policy() {
        assert!(RateLimitError::QuotaNotFound("k".to_string()).is_missing_policy());
        assert!(!RateLimitError::Timeout("t".to_string()).is_missing_policy());
    }
}
