//! Telemetry decode errors

use thiserror::Error;

/// Errors produced while decoding a producer message
///
/// A non-numeric temperature is not an error: it decodes to an invalid
/// reading. Only payloads whose structure cannot be understood end up here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The payload is not a usable reading object
    #[error("Malformed message: {0}")]
    Malformed(String),
}

impl ParseError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ParseError::Malformed(reason.into())
    }
}

/// Result type alias for parse operations
pub type ParseResult<T> = Result<T, ParseError>;
