//! Error types for the shared store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a [`KeyValueStore`](super::KeyValueStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis returned an error or the connection failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The operation did not complete in time.
    #[error("store operation timed out: {0}")]
    Timeout(String),

    /// No connection could be checked out.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value had an unexpected type or format.
    #[error("unexpected store data: {0}")]
    Data(String),
}

impl StoreError {
    /// Check if the error is transient (connection, timeout, pool).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Redis(_) | Self::Timeout(_) | Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::Timeout("GET quota".to_string());
        assert_eq!(err.to_string(), "store operation timed out: GET quota");

        let err = StoreError::Data("WRONGTYPE".to_string());
        assert_eq!(err.to_string(), "unexpected store data: WRONGTYPE");
    }

    #[test]
    fn test_is_recoverable() {
        assert!(StoreError::Timeout("x".to_string()).is_recoverable());
        assert!(StoreError::Unavailable("x".to_string()).is_recoverable());
        assert!(!StoreError::Data("x".to_string()).is_recoverable());
    }
}
