//! Error types for the gateway module.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that can occur in the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Listen address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The upstream URL is unusable.
    #[error("invalid upstream: {0}")]
    InvalidUpstream(String),

    /// The request could not be rewritten for the upstream.
    #[error("invalid upstream request: {0}")]
    InvalidRequest(#[from] http::Error),

    /// The upstream did not answer.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    /// The server is already running.
    #[error("gateway already running")]
    AlreadyRunning,

    /// The server is not running.
    #[error("gateway not running")]
    NotRunning,
}

impl GatewayError {
    /// Check if the error is the upstream's fault.
    #[must_use]
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}
