//! Reading Parser
//!
//! Decodes one producer message into a [`SensorReading`]. The decode is
//! explicit about the three possible outcomes:
//!
//! - `Ok` with a valid temperature
//! - `Ok` with [`Temperature::Invalid`] when `battery_temperature` is present
//!   but cannot be coerced to a finite number
//! - `Err(ParseError::Malformed)` when the structure itself is unusable

use serde_json::{Map, Value};

use super::error::{ParseError, ParseResult};
use super::reading::{SensorReading, Temperature};

/// Field carrying the battery temperature
pub const TEMPERATURE_FIELD: &str = "battery_temperature";

/// Field carrying the producer timestamp (milliseconds)
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Parse a raw payload into a reading
pub fn parse(raw: &[u8]) -> ParseResult<SensorReading> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| ParseError::malformed("payload is not valid UTF-8"))?
        .trim();

    if text.is_empty() {
        return Err(ParseError::malformed("empty payload"));
    }

    let value: Value = serde_json::from_str(text)
        .map_err(|e| ParseError::malformed(format!("invalid JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| ParseError::malformed("payload is not a JSON object"))?;

    parse_object(object)
}

fn parse_object(object: &Map<String, Value>) -> ParseResult<SensorReading> {
    let temperature = object
        .get(TEMPERATURE_FIELD)
        .ok_or_else(|| ParseError::malformed(format!("missing field `{}`", TEMPERATURE_FIELD)))?;

    let timestamp = object
        .get(TIMESTAMP_FIELD)
        .ok_or_else(|| ParseError::malformed(format!("missing field `{}`", TIMESTAMP_FIELD)))?;

    Ok(SensorReading {
        battery_temperature: coerce_temperature(temperature),
        timestamp_millis: coerce_timestamp(timestamp)?,
    })
}

/// Numbers and numeric strings are accepted; everything else is invalid
fn coerce_temperature(value: &Value) -> Temperature {
    let coerced = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match coerced {
        Some(t) if t.is_finite() => Temperature::Valid(t),
        _ => Temperature::Invalid(value.to_string()),
    }
}

/// Integer timestamps pass through; fractional ones truncate toward zero
fn coerce_timestamp(value: &Value) -> ParseResult<i64> {
    let number = match value {
        Value::Number(n) => n,
        other => {
            return Err(ParseError::malformed(format!(
                "`{}` must be a number, got {}",
                TIMESTAMP_FIELD, other
            )))
        }
    };

    if let Some(ts) = number.as_i64() {
        return Ok(ts);
    }

    match number.as_f64() {
        // u64 values above i64::MAX also land here and fail the range check
        Some(f) if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(f.trunc() as i64)
        }
        _ => Err(ParseError::malformed(format!(
            "`{}` is out of range: {}",
            TIMESTAMP_FIELD, number
        ))),
    }
}
