//! # Spyder
//!
//! Real-time telemetry relay: accepts vehicle sensor readings from producers
//! over raw TCP and rebroadcasts each valid reading to every connected
//! dashboard over WebSocket.
//!
//! ## Features
//!
//! - **Explicit decoding**: malformed payloads and invalid temperatures are
//!   told apart and counted, never forwarded
//! - **Hysteresis warnings**: per-producer score that avoids alert flapping
//! - **Best-effort fan-out**: bounded per-consumer queues; slow consumers are
//!   dropped instead of stalling producers
//! - **Graceful shutdown**: stop accepting, drain queued frames, close sockets
//!
//! ## Modules
//!
//! - [`telemetry`]: Reading types, parser and warning detector
//! - [`registry`]: Shared registry of consumer sessions
//! - [`relay`]: Parse → detect → fan-out coordinator and counters
//! - [`ingest`]: Producer TCP listener
//! - [`broadcast`]: Consumer WebSocket listener and HTTP endpoints
//! - [`server`]: Runs both listeners
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spyder::config::Config;
//! use spyder::server::RelayServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     spyder::logging::init(&config.logging);
//!
//!     // Producers connect to :12000, dashboards to ws://host:8080
//!     let server = RelayServer::bind(&config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod registry;
pub mod relay;
pub mod server;
pub mod telemetry;

// Re-export top-level types for convenience
pub use config::Config;
pub use registry::ClientRegistry;
pub use relay::{RelayCoordinator, RelayMetrics};
pub use server::{RelayServer, ServerError};
pub use telemetry::{parse, SensorReading, WarningDetector};
