//! Byte payloads and their hex text form.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ParseError;

/// An immutable run of bytes: read results, write payloads, program images.
///
/// Serialises as `$`-prefixed uppercase hex so JSON records stay readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteBuffer(Vec<u8>);

impl ByteBuffer {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Hex form without the `$` marker, as HTTP query parameters want it.
    #[must_use]
    pub fn to_hex(&self) -> String {
        use fmt::Write;
        let mut out = String::with_capacity(self.0.len() * 2);
        for byte in &self.0 {
            let _ = write!(out, "{byte:02X}");
        }
        out
    }
}

impl Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for ByteBuffer {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes.to_vec())
    }
}

impl std::str::FromStr for ByteBuffer {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bytes(s)
    }
}

impl fmt::Display for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.to_hex())
    }
}

impl Serialize for ByteBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_bytes(&self.0))
    }
}

impl<'de> Deserialize<'de> for ByteBuffer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_bytes(&text).map_err(serde::de::Error::custom)
    }
}

/// Parse hex text (optionally `$` or `0x` prefixed) into bytes.
pub fn parse_bytes(text: &str) -> Result<ByteBuffer, ParseError> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix('$')
        .or_else(|| trimmed.strip_prefix("0x"))
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() {
        return Err(ParseError::NoHexDigits);
    }
    if let Some((position, digit)) = digits.char_indices().find(|(_, c)| !c.is_ascii_hexdigit()) {
        return Err(ParseError::InvalidHexDigit { digit, position });
    }
    if digits.len() % 2 != 0 {
        return Err(ParseError::OddHexDigits {
            count: digits.len(),
        });
    }

    let bytes = digits
        .as_bytes()
        .chunks_exact(2)
        .map(|pair| (nibble(pair[0]) << 4) | nibble(pair[1]))
        .collect();
    Ok(ByteBuffer(bytes))
}

/// Render bytes as `$` followed by uppercase hex.
#[must_use]
pub fn format_bytes(bytes: &[u8]) -> String {
    ByteBuffer::from(bytes).to_string()
}

// Callers have already checked is_ascii_hexdigit.
fn nibble(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}
