//! Configuration type definitions.

use super::error::{ConfigError, ConfigResult};
use crate::modules::catalog::CoordinatorSettings;
use crate::modules::rate_limiting::{EvaluatorSettings, MissingPolicy};
use crate::store::StoreConfig;
use http::HeaderName;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener, upstream and decision settings.
    pub gateway: GatewaySection,

    /// Shared store.
    pub store: StoreConfig,

    /// Catalog sources and polling.
    pub catalog: CatalogConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Where sliding windows are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CounterBackend {
    /// In the shared store, consistent across instances.
    #[default]
    Distributed,
    /// In process memory, per instance.
    Local,
}

/// `[gateway]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Listen address.
    pub listen: SocketAddr,

    /// Upstream base URL.
    pub upstream: String,

    /// Upstream connect timeout in milliseconds.
    pub upstream_connect_timeout_ms: u64,

    /// Header carrying the caller's API key.
    pub api_key_header: String,

    /// Forward requests whose route is not in the catalog.
    pub allow_unknown_paths: bool,

    /// Behavior for buckets without a quota.
    pub missing_policy: MissingPolicy,

    /// Deadline for each store call made while evaluating a request.
    pub store_timeout_ms: u64,

    /// Sliding window backend.
    pub counter: CounterBackend,

    /// Honor API key block markers kept in the shared store.
    pub key_blocking: bool,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 7777),
            upstream: "http://127.0.0.1:8000".to_string(),
            upstream_connect_timeout_ms: 1000,
            api_key_header: "X-Api-Key".to_string(),
            allow_unknown_paths: false,
            missing_policy: MissingPolicy::Deny,
            store_timeout_ms: 250,
            counter: CounterBackend::Distributed,
            key_blocking: false,
        }
    }
}

impl GatewaySection {
    /// Store deadline as a duration.
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Upstream connect timeout as a duration.
    #[must_use]
    pub fn upstream_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_connect_timeout_ms)
    }

    /// Decision settings for the evaluator.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key header is not a valid header name.
    pub fn evaluator_settings(&self) -> ConfigResult<EvaluatorSettings> {
        let api_key_header = HeaderName::try_from(self.api_key_header.as_str()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "gateway.api_key_header".to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(EvaluatorSettings {
            api_key_header,
            allow_unknown_paths: self.allow_unknown_paths,
            missing_policy: self.missing_policy,
            store_timeout: self.store_timeout(),
        })
    }
}

/// `[catalog]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog applied at startup.
    pub file: Option<PathBuf>,

    /// Control server base URL. Background updates are off when unset.
    pub server_url: Option<String>,

    /// Credential sent to the control server.
    pub server_api_key: String,

    /// Control server poll interval in seconds, 0 to disable.
    pub server_poll_secs: u64,

    /// Shared store poll interval in seconds, 0 to disable.
    pub store_poll_secs: u64,

    /// Ask for the latest version before a timed full fetch.
    pub check_latest_version: bool,

    /// Control server request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            file: None,
            server_url: None,
            server_api_key: String::new(),
            server_poll_secs: 10,
            store_poll_secs: 3,
            check_latest_version: true,
            request_timeout_ms: 5000,
        }
    }
}

impl CatalogConfig {
    /// Request timeout as a duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Coordinator poll settings.
    #[must_use]
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings::new(
            Duration::from_secs(self.server_poll_secs),
            Duration::from_secs(self.store_poll_secs),
            self.check_latest_version,
        )
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: LogLevel,

    /// Log format (json, pretty, compact).
    pub format: LogFormat,

    /// Output destination.
    pub output: LogOutput,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace,
    /// Debug level.
    Debug,
    /// Info level (default).
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level (least verbose).
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (machine-readable).
    Json,
    /// Pretty format with colors (default).
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
}

/// Log output destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output (default).
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
}
