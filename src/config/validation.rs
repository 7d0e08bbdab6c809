//! Configuration validation system.

use super::types::GatewayConfig;
use crate::store::StoreBackend;
use http::{HeaderName, Uri};

/// A single validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
    /// Severity level.
    pub severity: ValidationSeverity,
}

impl ValidationError {
    /// Create a new error.
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Create a new warning.
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }
}

/// Severity of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Error - configuration is invalid.
    Error,
    /// Warning - configuration may have issues.
    Warning,
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a new empty (valid) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Check if the validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self
            .errors
            .iter()
            .any(|e| e.severity == ValidationSeverity::Error)
    }

    /// Get all validation errors.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Get only errors (not warnings).
    #[must_use]
    pub fn errors_only(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Error)
            .collect()
    }

    /// Get only warnings.
    #[must_use]
    pub fn warnings(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Warning)
            .collect()
    }
}

/// Trait for configuration validators.
pub trait Validator: std::fmt::Debug + Send + Sync {
    /// Validate a configuration and return any errors.
    fn validate(&self, config: &GatewayConfig) -> ValidationResult;
}

/// Built-in validator for basic configuration checks.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create a new basic validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for BasicValidator {
    fn validate(&self, config: &GatewayConfig) -> ValidationResult {
        let mut result = ValidationResult::new();
        let gateway = &config.gateway;

        if gateway.api_key_header.is_empty() {
            result.add_error(ValidationError::error(
                "gateway.api_key_header",
                "API key header cannot be empty",
            ));
        } else if HeaderName::try_from(gateway.api_key_header.as_str()).is_err() {
            result.add_error(ValidationError::error(
                "gateway.api_key_header",
                format!("Invalid header name: {}", gateway.api_key_header),
            ));
        }

        if gateway.upstream.parse::<Uri>().map_or(true, |u| u.scheme().is_none()) {
            result.add_error(ValidationError::error(
                "gateway.upstream",
                format!("Upstream must be an absolute URL: {}", gateway.upstream),
            ));
        }

        if gateway.store_timeout_ms == 0 {
            result.add_error(ValidationError::error(
                "gateway.store_timeout_ms",
                "Store timeout cannot be 0",
            ));
        }

        if config.store.max_connections == 0 {
            result.add_error(ValidationError::error(
                "store.max_connections",
                "Store connection limit cannot be 0",
            ));
        }

        if config.store.backend == StoreBackend::Redis && config.store.address.is_empty() {
            result.add_error(ValidationError::error(
                "store.address",
                "Address is required for the redis backend",
            ));
        }

        let catalog = &config.catalog;
        if catalog.server_url.is_some() && catalog.server_api_key.is_empty() {
            result.add_error(ValidationError::error(
                "catalog.server_api_key",
                "API key is required when a control server is configured",
            ));
        }

        if catalog.server_url.is_none() && catalog.file.is_none() {
            result.add_error(ValidationError::warning(
                "catalog",
                "No catalog file or control server; every routed request will be rejected",
            ));
        }

        result
    }
}
