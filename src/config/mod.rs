//! # Configuration System
//!
//! TOML-based configuration for the gateway: parsing, defaults and
//! validation.
//!
//! ## Example Configuration
//!
//! ```toml
//! [gateway]
//! listen = "0.0.0.0:7777"
//! upstream = "http://127.0.0.1:8000"
//! api_key_header = "X-Api-Key"
//! missing_policy = "deny"
//!
//! [store]
//! backend = "redis"
//! address = "redis://127.0.0.1:6379"
//!
//! [catalog]
//! file = "/etc/dynlimits/catalog.json"
//! server_url = "http://control:9000"
//! server_api_key = "secret"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{
    CatalogConfig, CounterBackend, GatewayConfig, GatewaySection, LogFormat, LogLevel,
    LogOutput, LoggingConfig,
};
pub use validation::{
    BasicValidator, ValidationError, ValidationResult, ValidationSeverity, Validator,
};
