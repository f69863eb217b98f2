//! Spyder Telemetry Relay
//!
//! Run with: cargo run --bin spyder
//!
//! # Configuration
//!
//! Optional TOML file from `SPYDER_CONFIG`, `~/.config/spyder/config.toml`,
//! `/etc/spyder/config.toml` or `./spyder.toml`, then environment variables:
//! - `INGEST_PORT`: Producer TCP port (default: 12000)
//! - `BROADCAST_PORT`: Consumer WebSocket port (default: 8080)
//! - `SPYDER_INGEST_HOST` / `SPYDER_BROADCAST_HOST`: Bind hosts (default: 0.0.0.0)
//! - `SPYDER_LOG_LEVEL`: Log level (default: info)
//! - `SPYDER_LOG_FORMAT`: `pretty` or `json` (default: pretty)
//! - `RUST_LOG`: Overrides the log level with a full filter

use anyhow::Context;
use spyder::config::Config;
use spyder::server::RelayServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = Config::locate();
    let config = match &config_path {
        Some(path) => Config::load_with_env(path)?,
        None => Config::from_env(),
    };

    spyder::logging::init(&config.logging);

    tracing::info!("Starting Spyder telemetry relay v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => tracing::info!("Loaded config from {:?}", path),
        None => tracing::info!("Using default config with environment overrides"),
    }
    tracing::info!(
        ingest = %config.ingest.addr(),
        broadcast = %config.broadcast.addr(),
        framing = ?config.ingest.framing,
        "Listener configuration"
    );

    let server = RelayServer::bind(&config)
        .await
        .context("Failed to start relay")?;
    server.run().await?;

    Ok(())
}
