//! Sensor reading types
//!
//! A [`SensorReading`] is what the parser hands to the relay. The temperature
//! is tagged so that readings which failed numeric coercion can flow through
//! the detector (to be counted) without ever reaching consumers.

use serde::Serialize;

/// Battery temperature as reported by a producer
#[derive(Debug, Clone, PartialEq)]
pub enum Temperature {
    /// A finite temperature value
    Valid(f64),
    /// The value could not be coerced to a finite number; holds the raw JSON text
    Invalid(String),
}

impl Temperature {
    /// Build from a float, tagging non-finite values as invalid
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            Temperature::Valid(value)
        } else {
            Temperature::Invalid(value.to_string())
        }
    }

    /// The numeric value, if valid
    pub fn value(&self) -> Option<f64> {
        match self {
            Temperature::Valid(v) => Some(*v),
            Temperature::Invalid(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Temperature::Valid(_))
    }
}

/// A single reading from the telemetry channel
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Battery temperature, valid or not
    pub battery_temperature: Temperature,
    /// Producer timestamp in milliseconds since the Unix epoch
    pub timestamp_millis: i64,
}

impl SensorReading {
    /// Create a reading from a numeric temperature
    pub fn new(temperature: f64, timestamp_millis: i64) -> Self {
        Self {
            battery_temperature: Temperature::from_f64(temperature),
            timestamp_millis,
        }
    }

    /// Create a reading whose temperature failed coercion
    pub fn invalid(raw: impl Into<String>, timestamp_millis: i64) -> Self {
        Self {
            battery_temperature: Temperature::Invalid(raw.into()),
            timestamp_millis,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.battery_temperature.is_valid()
    }

    /// Wire representation for consumers. `None` for invalid readings,
    /// which are never broadcast.
    pub fn to_wire(&self) -> Option<WireReading> {
        self.battery_temperature
            .value()
            .map(|battery_temperature| WireReading {
                battery_temperature,
                timestamp: self.timestamp_millis,
            })
    }
}

/// JSON shape shared by producers and consumers:
/// `{"battery_temperature": 25.5, "timestamp": 1700000000000}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WireReading {
    pub battery_temperature: f64,
    pub timestamp: i64,
}
