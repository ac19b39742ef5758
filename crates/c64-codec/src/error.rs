//! Parse failures for textual addresses and byte payloads.

use thiserror::Error;

/// Malformed address, byte or program text.
///
/// Always produced locally; nothing that fails to parse is ever sent to a
/// backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unable to parse address '{input}': {reason}")]
    Address { input: String, reason: String },

    #[error("no hexadecimal digits found")]
    NoHexDigits,

    #[error("expected an even number of hex digits, got {count}")]
    OddHexDigits { count: usize },

    #[error("invalid hex digit '{digit}' at position {position}")]
    InvalidHexDigit { digit: char, position: usize },

    #[error("PRG too short: {len} bytes (need a 2-byte load address and at least one data byte)")]
    PrgTooShort { len: usize },

    #[error("PRG of {len} data bytes at ${load_address:04X} runs past $FFFF")]
    PrgOverflow { load_address: u16, len: usize },
}

impl ParseError {
    pub(crate) fn address(input: &str, reason: impl Into<String>) -> Self {
        Self::Address {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
