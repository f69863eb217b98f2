//! Broadcast Listener State
//!
//! Shared state for the WebSocket and HTTP handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::task::TaskTracker;

use crate::config::ThresholdsConfig;
use crate::registry::ClientRegistry;
use crate::relay::RelayMetrics;

/// Shared state for the broadcast router
#[derive(Clone)]
pub struct BroadcastState {
    /// Open consumer sessions
    pub registry: Arc<ClientRegistry>,
    /// Relay counters
    pub metrics: Arc<RelayMetrics>,
    /// Bands published to the presentation layer
    pub thresholds: ThresholdsConfig,
    /// Upper bound on a single socket send
    pub send_timeout: Duration,
    /// Server start time for uptime tracking
    pub start_time: Instant,
    /// Running session tasks, awaited on shutdown
    pub sessions: TaskTracker,
}

impl BroadcastState {
    pub fn new(
        registry: Arc<ClientRegistry>,
        metrics: Arc<RelayMetrics>,
        thresholds: ThresholdsConfig,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            metrics,
            thresholds,
            send_timeout,
            start_time: Instant::now(),
            sessions: TaskTracker::new(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
