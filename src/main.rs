//! Kitstream Server
//!
//! Run with: cargo run --bin kitstream -- --config config.toml
//!
//! # Configuration
//!
//! Without `--config`, the default locations are searched (see
//! [`Config::load_default`]). Environment variables override file values:
//! - `KITSTREAM_HOST`, `KITSTREAM_PORT`: Bind address
//! - `KITSTREAM_JWT_SECRET`: Token signing secret
//! - `KITSTREAM_LOG_LEVEL`, `KITSTREAM_LOG_FORMAT`: Logging
//! - `RUST_LOG`: Full filter directive, takes precedence over the log level

use clap::Parser;
use kitstream::api::{serve, AppState};
use kitstream::config::{Config, ConfigReport, LoggingConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kitstream")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time measurement streaming for sensor kits")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (config, report) = match &args.config {
        Some(path) => (Config::load_with_env(path)?, ConfigReport::from_file(path)),
        None => Config::load_default(),
    };

    init_logging(&config.logging);
    report.log();

    tracing::info!("Starting Kitstream v{}", env!("CARGO_PKG_VERSION"));

    config.validate()?;

    let state = AppState::from_config(&config);
    tracing::info!(
        kits = config.directory.kits.len(),
        persons = config.directory.persons.len(),
        sensor_types = config.sensors.len(),
        max_connections = config.hub.max_connections,
        "Loaded configuration"
    );

    serve(state, &config.server).await?;

    tracing::info!("Kitstream stopped");
    Ok(())
}

/// Initialize tracing from the logging config
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("kitstream={},tower_http=debug", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
