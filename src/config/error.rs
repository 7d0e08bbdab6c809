//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or interpreting the gateway configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("cannot read '{path}': {source}")]
    Read {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`GatewayConfig`](super::GatewayConfig).
    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// One or more validators rejected the configuration.
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// A field parsed but holds a value the gateway cannot use.
    #[error("invalid value for field '{field}': {message}")]
    InvalidValue {
        /// Name of the field.
        field: String,
        /// Error message.
        message: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
