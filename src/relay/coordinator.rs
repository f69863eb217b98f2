//! Relay Coordinator
//!
//! Receives decoded readings from ingest connections, runs them through the
//! connection's [`WarningDetector`], and fans valid readings out through the
//! [`ClientRegistry`]. Independent of either transport, so the whole
//! parse → detect → broadcast path can be driven directly in tests.

use std::sync::Arc;

use crate::broadcast::ServerMessage;
use crate::registry::{BroadcastReport, ClientRegistry};
use crate::telemetry::{
    parse, Detection, InvalidReadingEvent, Observation, ParseError, SensorReading, ThresholdBand,
    WarningDetector, DEFAULT_WARNING_BAND,
};

use super::metrics::RelayMetrics;

/// Coordinator behaviour switches
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Band handed to each new detector
    pub warning_band: ThresholdBand,
    /// Also fan warning events out to consumers
    pub broadcast_warnings: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            warning_band: DEFAULT_WARNING_BAND,
            broadcast_warnings: false,
        }
    }
}

/// What happened to one producer message
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    /// Valid reading, scored and fanned out
    Broadcast {
        observation: Observation,
        report: BroadcastReport,
    },
    /// Temperature failed coercion; counted, not forwarded
    Invalid(InvalidReadingEvent),
    /// Payload could not be decoded; dropped
    Malformed(ParseError),
}

/// Wires the parser, detector and registry together
#[derive(Debug)]
pub struct RelayCoordinator {
    registry: Arc<ClientRegistry>,
    metrics: Arc<RelayMetrics>,
    config: CoordinatorConfig,
}

impl RelayCoordinator {
    pub fn new(
        registry: Arc<ClientRegistry>,
        metrics: Arc<RelayMetrics>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            metrics,
            config,
        }
    }

    /// Fresh detector for a new producer connection
    pub fn detector(&self) -> WarningDetector {
        WarningDetector::new(self.config.warning_band)
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Decode a raw producer message and relay it
    pub async fn handle_payload(
        &self,
        detector: &mut WarningDetector,
        payload: &[u8],
    ) -> RelayOutcome {
        match parse(payload) {
            Ok(reading) => self.relay(detector, &reading).await,
            Err(e) => {
                self.metrics.record_malformed();
                tracing::warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "Dropping malformed message"
                );
                RelayOutcome::Malformed(e)
            }
        }
    }

    /// Score a decoded reading and, if valid, broadcast it
    pub async fn relay(
        &self,
        detector: &mut WarningDetector,
        reading: &SensorReading,
    ) -> RelayOutcome {
        self.metrics.record_reading();

        let observation = match detector.observe(reading) {
            Detection::Scored(observation) => observation,
            Detection::Invalid(event) => {
                self.metrics.record_invalid();
                tracing::warn!(
                    raw = %event.raw,
                    timestamp = event.timestamp_millis,
                    "Received invalid temperature"
                );
                return RelayOutcome::Invalid(event);
            }
        };

        tracing::debug!(
            temperature = observation.temperature,
            timestamp = observation.timestamp_millis,
            score = observation.score,
            "Received reading"
        );

        if let Some(warning) = &observation.warning {
            self.metrics.record_warning();
            tracing::warn!(
                temperature = warning.temperature,
                timestamp = warning.timestamp_millis,
                "Battery temperature warning"
            );
        }

        let report = match reading.to_wire() {
            Some(wire) => self.fan_out(&ServerMessage::from(wire)).await,
            None => BroadcastReport::default(),
        };
        self.metrics.record_broadcast(&report);

        if self.config.broadcast_warnings {
            if let Some(warning) = &observation.warning {
                let warning_report = self.fan_out(&ServerMessage::warning(warning)).await;
                self.metrics.record_delivery(&warning_report);
            }
        }

        RelayOutcome::Broadcast {
            observation,
            report,
        }
    }

    async fn fan_out(&self, message: &ServerMessage) -> BroadcastReport {
        match message.to_frame() {
            Ok(frame) => self.registry.broadcast(&frame).await,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize outbound message");
                BroadcastReport::default()
            }
        }
    }
}
