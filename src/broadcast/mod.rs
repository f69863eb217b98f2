//! Consumer Broadcast
//!
//! WebSocket server pushing every valid reading to connected dashboards.
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /` - Live reading stream
//! - `GET /ws` - Same stream
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Health status
//!
//! ## Observability
//! - `GET /stats` - Relay counters
//! - `GET /thresholds` - Warning and display bands
//!
//! # Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8080');
//!
//! ws.onmessage = (event) => {
//!   const reading = JSON.parse(event.data);
//!   console.log(reading.battery_temperature, reading.timestamp);
//! };
//! ```
//!
//! Frames sent by consumers are ignored. Sessions that fall behind are
//! dropped; consumers are expected to reconnect.

mod handler;
mod messages;
pub mod routes;
mod state;

pub use handler::websocket_handler;
pub use messages::{MessageKind, ServerMessage};
pub use state::BroadcastState;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the broadcast router with all routes and middleware
pub fn build_router(state: Arc<BroadcastState>) -> Router {
    let health_routes = Router::new()
        .route("/live", get(routes::liveness))
        .route("/", get(routes::health));

    Router::new()
        .route("/", get(websocket_handler))
        .route("/ws", get(websocket_handler))
        .route("/stats", get(routes::stats))
        .route("/thresholds", get(routes::thresholds))
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP/WebSocket listener for consumers
pub struct BroadcastListener {
    listener: TcpListener,
    state: Arc<BroadcastState>,
}

impl BroadcastListener {
    /// Bind the broadcast address
    pub async fn bind(addr: &str, state: Arc<BroadcastState>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until cancelled
    ///
    /// Upgraded sessions outlive this call; they are closed through the
    /// registry and awaited through [`BroadcastState::sessions`].
    pub async fn run(self, cancel: CancellationToken) -> std::io::Result<()> {
        if let Ok(addr) = self.local_addr() {
            tracing::info!(%addr, "Broadcast listener started");
        }

        let router = build_router(self.state);
        axum::serve(self.listener, router)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await?;

        tracing::info!("Broadcast listener stopped");
        Ok(())
    }
}
