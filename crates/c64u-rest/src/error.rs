//! REST client failures.

use c64_codec::ParseError;
use c64_codec::sid::SidError;
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestError {
    /// Arguments rejected before any request was sent.
    #[error("invalid {operation} request: {reason}")]
    Validation {
        operation: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Sid(#[from] SidError),

    /// Connection-level failure: DNS, refused, reset, timed out.
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// The device answered but reported failure. `details` is whatever it
    /// sent back: a JSON value, plain text, or nothing.
    #[error("{operation} failed (HTTP {status}){}", details_suffix(.details))]
    Execution {
        operation: String,
        status: u16,
        details: Option<JsonValue>,
    },

    /// A success response whose body could not be understood.
    #[error("cannot decode {operation} response: {reason}")]
    Decode {
        operation: &'static str,
        reason: String,
    },
}

impl RestError {
    pub(crate) fn validation(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            operation,
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode {
            operation,
            reason: reason.into(),
        }
    }
}

fn details_suffix(details: &Option<JsonValue>) -> String {
    match details {
        Some(JsonValue::String(text)) => format!(": {text}"),
        Some(value) => format!(": {value}"),
        None => String::new(),
    }
}
