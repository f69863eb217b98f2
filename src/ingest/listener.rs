//! Ingest TCP listener
//!
//! Accepts producer connections and spawns a [`ProducerConnection`] task for
//! each. Connection tasks are tracked so shutdown can wait for them after the
//! accept loop stops.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, Instrument};

use super::connection::{Framing, ProducerConnection};
use crate::relay::RelayCoordinator;

/// Accept loop for producer connections
pub struct IngestListener {
    listener: TcpListener,
    coordinator: Arc<RelayCoordinator>,
    framing: Framing,
    max_frame_bytes: usize,
    connection_counter: AtomicU64,
    tracker: TaskTracker,
}

impl IngestListener {
    /// Bind the ingest address
    pub async fn bind(
        addr: &str,
        coordinator: Arc<RelayCoordinator>,
        framing: Framing,
        max_frame_bytes: usize,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            coordinator,
            framing,
            max_frame_bytes,
            connection_counter: AtomicU64::new(0),
            tracker: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until cancelled, then wait for open connections to
    /// finish
    pub async fn run(self, cancel: CancellationToken) {
        if let Ok(addr) = self.local_addr() {
            info!(%addr, "Ingest listener started");
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Ingest listener stopping");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer, cancel.child_token()),
                        Err(e) => {
                            // Continue accepting other connections
                            error!(error = %e, "Failed to accept producer connection");
                        }
                    }
                }
            }
        }

        drop(self.listener);
        self.tracker.close();
        self.tracker.wait().await;
        info!("Ingest listener stopped");
    }

    fn spawn_connection(
        &self,
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
        cancel: CancellationToken,
    ) {
        let connection = self.connection_counter.fetch_add(1, Ordering::Relaxed);
        let span = info_span!("producer", connection, %peer);
        let handler = ProducerConnection::new(
            stream,
            peer,
            Arc::clone(&self.coordinator),
            self.framing,
            self.max_frame_bytes,
        );

        // Errors are logged inside run()
        self.tracker.spawn(
            async move {
                let _ = handler.run(cancel).await;
            }
            .instrument(span),
        );
    }
}
