//! Warning Detector
//!
//! A hysteresis score classifies the reading stream of one producer
//! connection. Each out-of-band reading adds one to the score, each in-band
//! reading subtracts one. Once the score exceeds [`WARNING_SCORE_LIMIT`] a
//! [`WarningEvent`] is emitted and the score is lowered by one, so the
//! detector re-arms instead of firing on every tick or resetting.
//!
//! The score is deliberately unclamped below: a long in-band run drives it
//! negative, and that many out-of-band readings are needed before the next
//! warning.

use serde::{Deserialize, Serialize};

use super::reading::{SensorReading, Temperature};

/// Score above which a warning fires
pub const WARNING_SCORE_LIMIT: i64 = 3;

/// Band used by the ingest path to decide whether a reading is out of range
pub const DEFAULT_WARNING_BAND: ThresholdBand = ThresholdBand::new(20.0, 40.0, true);

/// Band the presentation layer uses for colouring values. Published to
/// consumers, never consulted by the detector.
pub const DEFAULT_DISPLAY_BAND: ThresholdBand = ThresholdBand::new(20.0, 80.0, true);

/// A closed or open temperature interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBand {
    /// Lower edge of the normal range
    pub lower: f64,
    /// Upper edge of the normal range
    pub upper: f64,
    /// Whether the edges themselves count as normal
    #[serde(default = "default_inclusive")]
    pub inclusive: bool,
}

fn default_inclusive() -> bool {
    true
}

impl ThresholdBand {
    pub const fn new(lower: f64, upper: f64, inclusive: bool) -> Self {
        Self {
            lower,
            upper,
            inclusive,
        }
    }

    /// Check whether a temperature is inside the normal range
    pub fn contains(&self, temperature: f64) -> bool {
        if self.inclusive {
            temperature >= self.lower && temperature <= self.upper
        } else {
            temperature > self.lower && temperature < self.upper
        }
    }
}

impl Default for ThresholdBand {
    fn default() -> Self {
        DEFAULT_WARNING_BAND
    }
}

/// Emitted when the hysteresis score crosses the limit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarningEvent {
    pub temperature: f64,
    pub timestamp_millis: i64,
}

/// Emitted for readings whose temperature failed coercion
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidReadingEvent {
    /// Raw JSON text of the rejected temperature
    pub raw: String,
    pub timestamp_millis: i64,
}

/// Result of scoring one valid reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub temperature: f64,
    pub timestamp_millis: i64,
    /// Whether the reading fell inside the warning band
    pub in_band: bool,
    /// Score right after the +1/-1 step
    pub peak_score: i64,
    /// Score after any re-arm
    pub score: i64,
    pub warning: Option<WarningEvent>,
}

/// What the detector made of a reading
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Scored(Observation),
    Invalid(InvalidReadingEvent),
}

/// Per-connection hysteresis state
#[derive(Debug, Clone)]
pub struct WarningDetector {
    band: ThresholdBand,
    score: i64,
}

impl WarningDetector {
    /// Create a detector with a fresh score of zero
    pub fn new(band: ThresholdBand) -> Self {
        Self { band, score: 0 }
    }

    /// Current score
    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn band(&self) -> ThresholdBand {
        self.band
    }

    /// Feed one reading through the state machine
    pub fn observe(&mut self, reading: &SensorReading) -> Detection {
        match &reading.battery_temperature {
            Temperature::Valid(t) => Detection::Scored(self.score_reading(*t, reading.timestamp_millis)),
            Temperature::Invalid(raw) => Detection::Invalid(InvalidReadingEvent {
                raw: raw.clone(),
                timestamp_millis: reading.timestamp_millis,
            }),
        }
    }

    fn score_reading(&mut self, temperature: f64, timestamp_millis: i64) -> Observation {
        let in_band = self.band.contains(temperature);
        if in_band {
            self.score -= 1;
        } else {
            self.score += 1;
        }
        let peak_score = self.score;

        let warning = if self.score > WARNING_SCORE_LIMIT {
            self.score -= 1;
            Some(WarningEvent {
                temperature,
                timestamp_millis,
            })
        } else {
            None
        };

        Observation {
            temperature,
            timestamp_millis,
            in_band,
            peak_score,
            score: self.score,
            warning,
        }
    }
}

impl Default for WarningDetector {
    fn default() -> Self {
        Self::new(DEFAULT_WARNING_BAND)
    }
}
