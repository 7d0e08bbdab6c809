//! Process-wide `tracing` subscriber setup.

use crate::config::{LogFormat, LogOutput, LoggingConfig};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_string()))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn format_layer(config: &LoggingConfig) -> BoxedLayer {
    let stderr = config.output == LogOutput::Stderr;
    match (config.format, stderr) {
        (LogFormat::Json, false) => fmt::layer().json().with_current_span(false).boxed(),
        (LogFormat::Json, true) => fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .boxed(),
        (LogFormat::Compact, false) => fmt::layer().compact().with_target(false).boxed(),
        (LogFormat::Compact, true) => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        (LogFormat::Pretty, false) => fmt::layer().pretty().boxed(),
        (LogFormat::Pretty, true) => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
///
/// # Errors
///
/// Returns an error if a global subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(format_layer(config))
        .with(env_filter(config))
        .try_init()
}
