//! Relay Core
//!
//! - [`coordinator`]: parse → detect → fan-out for each producer message
//! - [`metrics`]: process-wide counters for observability

pub mod coordinator;
pub mod metrics;

pub use coordinator::{CoordinatorConfig, RelayCoordinator, RelayOutcome};
pub use metrics::{MetricsSnapshot, ProducerGuard, RelayMetrics};
