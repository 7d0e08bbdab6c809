//! r0n-dynlimits binary entry point.

use r0n_dynlimits::config::{BasicValidator, ConfigLoader};
use r0n_dynlimits::logging;
use r0n_dynlimits::runtime::Gateway;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

const DEFAULT_CONFIG: &str = "dynlimits.toml";

fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("DYNLIMITS_CONFIG"))
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from)
}

#[tokio::main]
async fn main() -> ExitCode {
    let path = config_path();
    let config = match ConfigLoader::new()
        .with_validator(BasicValidator::new())
        .load_or_default(&path)
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("r0n-dynlimits: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("r0n-dynlimits: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        "starting r0n-dynlimits"
    );

    let mut gateway = match Gateway::build(config).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!(error = %e, "failed to build gateway");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = gateway.start().await {
        error!(error = %e, "failed to start gateway");
        return ExitCode::FAILURE;
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown requested");
    gateway.shutdown().await;
    ExitCode::SUCCESS
}
