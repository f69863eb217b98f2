//! Process-wide relay counters
//!
//! Plain atomics, exposed through `GET /stats`. Nothing here is persisted.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::registry::BroadcastReport;

/// Counters shared by every connection task
#[derive(Debug, Default)]
pub struct RelayMetrics {
    readings_received: AtomicU64,
    readings_broadcast: AtomicU64,
    invalid_readings: AtomicU64,
    malformed_messages: AtomicU64,
    warnings: AtomicU64,
    delivery_attempts: AtomicU64,
    delivery_failures: AtomicU64,
    sessions_evicted: AtomicU64,
    active_producers: AtomicU64,
}

/// Serializable copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub readings_received: u64,
    pub readings_broadcast: u64,
    pub invalid_readings: u64,
    pub malformed_messages: u64,
    pub warnings: u64,
    pub delivery_attempts: u64,
    pub delivery_failures: u64,
    pub sessions_evicted: u64,
    pub active_producers: u64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reading(&self) {
        self.readings_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid(&self) {
        self.invalid_readings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_warning(&self) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for one fan-out of a reading
    pub fn record_broadcast(&self, report: &BroadcastReport) {
        self.readings_broadcast.fetch_add(1, Ordering::Relaxed);
        self.record_delivery(report);
    }

    /// Account for the sends of any fan-out pass
    pub fn record_delivery(&self, report: &BroadcastReport) {
        self.delivery_attempts
            .fetch_add(report.attempted as u64, Ordering::Relaxed);
        self.delivery_failures
            .fetch_add(report.failed() as u64, Ordering::Relaxed);
        self.sessions_evicted
            .fetch_add(report.evicted as u64, Ordering::Relaxed);
    }

    pub fn invalid_readings(&self) -> u64 {
        self.invalid_readings.load(Ordering::Relaxed)
    }

    pub fn active_producers(&self) -> u64 {
        self.active_producers.load(Ordering::Relaxed)
    }

    /// Count a producer connection for as long as the guard lives
    pub fn producer_connected(self: &Arc<Self>) -> ProducerGuard {
        self.active_producers.fetch_add(1, Ordering::Relaxed);
        ProducerGuard {
            metrics: Arc::clone(self),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            readings_received: self.readings_received.load(Ordering::Relaxed),
            readings_broadcast: self.readings_broadcast.load(Ordering::Relaxed),
            invalid_readings: self.invalid_readings.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            delivery_attempts: self.delivery_attempts.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            sessions_evicted: self.sessions_evicted.load(Ordering::Relaxed),
            active_producers: self.active_producers.load(Ordering::Relaxed),
        }
    }
}

/// Decrements the active producer gauge on drop
#[derive(Debug)]
pub struct ProducerGuard {
    metrics: Arc<RelayMetrics>,
}

impl Drop for ProducerGuard {
    fn drop(&mut self) {
        self.metrics.active_producers.fetch_sub(1, Ordering::Relaxed);
    }
}
