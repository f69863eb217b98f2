//! Telemetry Domain
//!
//! Pure, transport-independent pieces of the relay:
//!
//! - [`parser`]: decode a producer message into a [`SensorReading`]
//! - [`detector`]: per-connection hysteresis warning detection
//! - [`reading`]: reading types and the consumer wire shape

pub mod detector;
pub mod error;
pub mod parser;
pub mod reading;

pub use detector::{
    Detection, InvalidReadingEvent, Observation, ThresholdBand, WarningDetector, WarningEvent,
    DEFAULT_DISPLAY_BAND, DEFAULT_WARNING_BAND, WARNING_SCORE_LIMIT,
};
pub use error::{ParseError, ParseResult};
pub use parser::parse;
pub use reading::{SensorReading, Temperature, WireReading};
