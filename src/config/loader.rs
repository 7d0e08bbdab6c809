//! Configuration file loader.

use super::error::{ConfigError, ConfigResult};
use super::types::GatewayConfig;
use super::validation::Validator;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

/// Reads `dynlimits.toml` and runs the registered validators over it.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    validators: Vec<Box<dyn Validator>>,
}

impl ConfigLoader {
    /// Create a loader with no validators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validator to the loader.
    #[must_use]
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Load the configuration at `path`, falling back to defaults when the
    /// file does not exist. Defaults are validated like a loaded file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is malformed, or fails
    /// validation.
    pub fn load_or_default<P: AsRef<Path>>(&self, path: P) -> ConfigResult<GatewayConfig> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => self.parse(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "No configuration file, using defaults");
                let config = GatewayConfig::default();
                self.validate(&config)?;
                Ok(config)
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or fails validation.
    pub fn parse(&self, content: &str) -> ConfigResult<GatewayConfig> {
        let config: GatewayConfig = toml::from_str(content)?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Warnings are logged; errors from every validator are reported together.
    fn validate(&self, config: &GatewayConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();
        for validator in &self.validators {
            let result = validator.validate(config);
            for warning in result.warnings() {
                warn!(field = %warning.field, "{}", warning.message);
            }
            errors.extend(
                result
                    .errors_only()
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message)),
            );
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BasicValidator;
    use crate::store::StoreBackend;
    use tempfile::tempdir;

    #[test]
    fn test_parse_overrides_defaults() {
        let config = ConfigLoader::new()
            .parse(
                r#"
            [gateway]
            upstream = "http://backend:9000"
        "#,
            )
            .unwrap();
        assert_eq!(config.gateway.upstream, "http://backend:9000");
        assert_eq!(config.store, GatewayConfig::default().store);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("dynlimits.toml");
        std::fs::write(
            &config_path,
            r#"
            [store]
            backend = "memory"
        "#,
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_validator(BasicValidator::new())
            .load_or_default(&config_path)
            .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = ConfigLoader::new()
            .with_validator(BasicValidator::new())
            .load_or_default(dir.path().join("absent.toml"))
            .unwrap();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn test_directory_is_read_error() {
        let dir = tempdir().unwrap();
        let err = ConfigLoader::new().load_or_default(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("dynlimits.toml");
        std::fs::write(&config_path, "[gateway\nupstream = 1").unwrap();

        let err = ConfigLoader::new().load_or_default(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validator_errors_reported_together() {
        let loader = ConfigLoader::new().with_validator(BasicValidator::new());
        let err = loader
            .parse(
                r#"
            [gateway]
            upstream = "backend:8000"

            [catalog]
            server_url = "http://control:9000"
        "#,
            )
            .unwrap_err();
        let ConfigError::Invalid(errors) = &err else {
            panic!("expected validation failure, got {err:?}");
        };
        assert_eq!(errors.len(), 2);
        assert!(err.to_string().contains("API key is required"));
        assert!(err.to_string().contains("gateway.upstream"));
    }
}
