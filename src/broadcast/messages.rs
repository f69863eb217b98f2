//! Outbound Message Types
//!
//! Frames pushed to consumers. Readings keep the producer wire shape so that
//! existing dashboards read them unchanged; warnings (only sent when enabled)
//! carry a `type` tag to tell them apart.

use serde::Serialize;
use std::sync::Arc;

use crate::registry::Frame;
use crate::telemetry::{WarningEvent, WireReading};

/// Messages sent from server to consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// A validated reading, `{"battery_temperature": .., "timestamp": ..}`
    Reading(WireReading),
    /// A hysteresis warning
    Warning {
        #[serde(rename = "type")]
        kind: MessageKind,
        battery_temperature: f64,
        timestamp: i64,
    },
}

/// Discriminator for tagged messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Warning,
}

impl ServerMessage {
    pub fn warning(event: &WarningEvent) -> Self {
        ServerMessage::Warning {
            kind: MessageKind::Warning,
            battery_temperature: event.temperature,
            timestamp: event.timestamp_millis,
        }
    }

    /// Serialize once into a frame shared by every session queue
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}

impl From<WireReading> for ServerMessage {
    fn from(reading: WireReading) -> Self {
        ServerMessage::Reading(reading)
    }
}
