//! Relay Server
//!
//! Owns both listeners and the state they share, and runs them until a
//! shutdown signal arrives.
//!
//! ```text
//!  producers ──TCP──▶ IngestListener ──▶ RelayCoordinator ──▶ ClientRegistry
//!                      (task per conn)     (parse, detect)        │ fan-out
//!                                                                 ▼
//!  consumers ◀──WS── BroadcastListener ◀── session writers ◀── session queues
//! ```
//!
//! # Shutdown
//!
//! 1. Both accept loops stop.
//! 2. Open producer connections are cancelled and awaited.
//! 3. Every session is released from the registry; session writers drain
//!    what is queued, send a Close frame and exit.
//! 4. Session writers are awaited for at most `shutdown_grace_ms`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::broadcast::{BroadcastListener, BroadcastState};
use crate::config::Config;
use crate::ingest::IngestListener;
use crate::registry::{ClientRegistry, RegistryConfig};
use crate::relay::{CoordinatorConfig, RelayCoordinator, RelayMetrics};

/// Errors that stop the relay
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {role} listener on {addr}: {error}")]
    Bind {
        role: &'static str,
        addr: String,
        error: std::io::Error,
    },

    #[error("Broadcast server error: {0}")]
    Broadcast(#[from] std::io::Error),

    #[error("Listener task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Both listeners, bound and ready to run
pub struct RelayServer {
    ingest: IngestListener,
    broadcast: BroadcastListener,
    registry: Arc<ClientRegistry>,
    metrics: Arc<RelayMetrics>,
    sessions: TaskTracker,
    shutdown_grace: Duration,
    cancel: CancellationToken,
}

impl RelayServer {
    /// Build the shared state and bind both listeners
    pub async fn bind(config: &Config) -> ServerResult<Self> {
        let registry = Arc::new(ClientRegistry::new(RegistryConfig {
            max_sessions: config.broadcast.max_sessions,
            queue_capacity: config.broadcast.session_queue_capacity,
        }));
        let metrics = Arc::new(RelayMetrics::new());

        let coordinator = Arc::new(RelayCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            CoordinatorConfig {
                warning_band: config.thresholds.warning,
                broadcast_warnings: config.relay.broadcast_warnings,
            },
        ));

        let ingest_addr = config.ingest.addr();
        let ingest = IngestListener::bind(
            &ingest_addr,
            coordinator,
            config.ingest.framing,
            config.ingest.max_frame_bytes,
        )
        .await
        .map_err(|error| ServerError::Bind {
            role: "ingest",
            addr: ingest_addr,
            error,
        })?;

        let state = BroadcastState::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            config.thresholds.clone(),
            config.broadcast.send_timeout(),
        );
        let sessions = state.sessions.clone();

        let broadcast_addr = config.broadcast.addr();
        let broadcast = BroadcastListener::bind(&broadcast_addr, Arc::new(state))
            .await
            .map_err(|error| ServerError::Bind {
                role: "broadcast",
                addr: broadcast_addr,
                error,
            })?;

        Ok(Self {
            ingest,
            broadcast,
            registry,
            metrics,
            sessions,
            shutdown_grace: config.broadcast.shutdown_grace(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn ingest_addr(&self) -> std::io::Result<SocketAddr> {
        self.ingest.local_addr()
    }

    pub fn broadcast_addr(&self) -> std::io::Result<SocketAddr> {
        self.broadcast.local_addr()
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run until Ctrl+C or SIGTERM
    pub async fn run(self) -> ServerResult<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` completes
    pub async fn run_until<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        let cancel = self.cancel;
        let ingest_task = tokio::spawn(self.ingest.run(cancel.clone()));
        let mut broadcast_task = tokio::spawn(self.broadcast.run(cancel.clone()));

        let early_exit = tokio::select! {
            _ = shutdown => None,
            result = &mut broadcast_task => Some(result),
        };

        tracing::info!("Starting graceful shutdown");
        cancel.cancel();

        ingest_task.await?;

        let released = self.registry.close_all().await;
        self.sessions.close();
        if tokio::time::timeout(self.shutdown_grace, self.sessions.wait())
            .await
            .is_err()
        {
            tracing::warn!(sessions = released, "Timed out draining consumer sessions");
        }

        match early_exit {
            Some(result) => result??,
            None => broadcast_task.await??,
        }

        tracing::info!(stats = ?self.metrics.snapshot(), "Relay stopped");
        Ok(())
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
