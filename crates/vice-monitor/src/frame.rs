//! Wire framing.
//!
//! Request (11-byte header):
//!
//! | Offset | Size | Field          |
//! |--------|------|----------------|
//! | 0      | 1    | STX (`0x02`)   |
//! | 1      | 1    | API version    |
//! | 2      | 4    | body length LE |
//! | 6      | 4    | request id LE  |
//! | 10     | 1    | command        |
//!
//! Response (12-byte header):
//!
//! | Offset | Size | Field                      |
//! |--------|------|----------------------------|
//! | 0      | 1    | STX (`0x02`)               |
//! | 1      | 1    | API version                |
//! | 2      | 4    | body length LE             |
//! | 6      | 1    | response type              |
//! | 7      | 1    | error code                 |
//! | 8      | 4    | request id LE (`0xFFFFFFFF` for events) |

use crate::{Command, MonitorError};

pub const STX: u8 = 0x02;
pub const API_VERSION: u8 = 0x02;
pub const REQUEST_HEADER_LEN: usize = 11;
pub const RESPONSE_HEADER_LEN: usize = 12;
/// Request id carried by unsolicited events.
pub const EVENT_REQUEST_ID: u32 = 0xFFFF_FFFF;
/// Largest body this client accepts; anything bigger is a corrupt length.
pub const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

/// An outgoing command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub request_id: u32,
    pub command: u8,
    pub body: Vec<u8>,
}

impl Request {
    #[must_use]
    pub fn new(request_id: u32, command: Command, body: Vec<u8>) -> Self {
        Self {
            request_id,
            command: command.id(),
            body,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(REQUEST_HEADER_LEN + self.body.len());
        out.push(STX);
        out.push(API_VERSION);
        out.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.request_id.to_le_bytes());
        out.push(self.command);
        out.extend_from_slice(&self.body);
        out
    }

    /// Decode one request from the front of `bytes`, returning it and the
    /// number of bytes consumed. `Ok(None)` means more bytes are needed.
    pub fn decode(bytes: &[u8]) -> Result<Option<(Self, usize)>, MonitorError> {
        let Some(body_len) = header_body_len(bytes, REQUEST_HEADER_LEN)? else {
            return Ok(None);
        };
        let total = REQUEST_HEADER_LEN + body_len;
        if bytes.len() < total {
            return Ok(None);
        }
        let request = Self {
            request_id: read_u32(&bytes[6..10]),
            command: bytes[10],
            body: bytes[REQUEST_HEADER_LEN..total].to_vec(),
        };
        Ok(Some((request, total)))
    }
}

/// An incoming frame: either a reply or an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub response_type: u8,
    pub error_code: u8,
    pub request_id: u32,
    pub body: Vec<u8>,
}

impl Response {
    #[must_use]
    pub fn is_event(&self) -> bool {
        self.request_id == EVENT_REQUEST_ID
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RESPONSE_HEADER_LEN + self.body.len());
        out.push(STX);
        out.push(API_VERSION);
        out.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        out.push(self.response_type);
        out.push(self.error_code);
        out.extend_from_slice(&self.request_id.to_le_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

/// Incremental response decoder. Socket reads may split or merge frames;
/// bytes are buffered until a whole frame is present.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes received but not yet part of a complete frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete frame. A bad preamble or an absurd length is
    /// a protocol error; the decoder does not try to resynchronise.
    pub fn next_frame(&mut self) -> Result<Option<Response>, MonitorError> {
        let Some(body_len) = header_body_len(&self.buf, RESPONSE_HEADER_LEN)? else {
            return Ok(None);
        };
        let total = RESPONSE_HEADER_LEN + body_len;
        if self.buf.len() < total {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buf.drain(..total).collect();
        Ok(Some(Response {
            response_type: frame[6],
            error_code: frame[7],
            request_id: read_u32(&frame[8..12]),
            body: frame[RESPONSE_HEADER_LEN..].to_vec(),
        }))
    }
}

/// Validate the fixed header prefix and return the body length, or
/// `None` if the header is still incomplete.
fn header_body_len(bytes: &[u8], header_len: usize) -> Result<Option<usize>, MonitorError> {
    if let Some(&first) = bytes.first() {
        if first != STX {
            return Err(MonitorError::Protocol(format!(
                "expected STX (0x02), got {first:#04X}"
            )));
        }
    }
    if bytes.len() < header_len {
        return Ok(None);
    }
    let body_len = read_u32(&bytes[2..6]) as usize;
    if body_len > MAX_BODY_LEN {
        return Err(MonitorError::Protocol(format!(
            "frame body length {body_len} exceeds {MAX_BODY_LEN}"
        )));
    }
    Ok(Some(body_len))
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_layout() {
        let request = Request::new(7, Command::Reset, vec![0x01]);
        assert_eq!(
            request.encode(),
            vec![0x02, 0x02, 0x01, 0x00, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00, 0xCC, 0x01]
        );
    }

    #[test]
    fn request_decode_needs_whole_frame() {
        let bytes = Request::new(1, Command::Ping, vec![]).encode();
        assert_eq!(Request::decode(&bytes[..5]), Ok(None));
        let (request, used) = Request::decode(&bytes).expect("valid").expect("complete");
        assert_eq!(used, REQUEST_HEADER_LEN);
        assert_eq!(request.command, 0x81);
        assert_eq!(request.request_id, 1);
    }

    #[test]
    fn decoder_handles_split_and_merged_frames() {
        let a = Response {
            response_type: 0x81,
            error_code: 0,
            request_id: 1,
            body: vec![],
        };
        let b = Response {
            response_type: 0x01,
            error_code: 0,
            request_id: 2,
            body: vec![0x02, 0x00, 0xAA, 0xBB],
        };
        let mut stream = a.encode();
        stream.extend(b.encode());

        let mut decoder = FrameDecoder::new();
        decoder.push(&stream[..7]);
        assert_eq!(decoder.next_frame(), Ok(None));
        decoder.push(&stream[7..]);
        assert_eq!(decoder.next_frame(), Ok(Some(a)));
        assert_eq!(decoder.next_frame(), Ok(Some(b)));
        assert_eq!(decoder.next_frame(), Ok(None));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn event_frames_are_flagged() {
        let event = Response {
            response_type: 0x62,
            error_code: 0,
            request_id: EVENT_REQUEST_ID,
            body: vec![0x00, 0xC0],
        };
        assert!(event.is_event());
    }

    #[test]
    fn bad_preamble_is_a_protocol_error() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0x7F, 0x02, 0x00]);
        assert!(matches!(decoder.next_frame(), Err(MonitorError::Protocol(_))));
    }

    #[test]
    fn absurd_length_is_a_protocol_error() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0x02, 0x02, 0xFF, 0xFF, 0xFF, 0xFF, 0x81, 0, 1, 0, 0, 0]);
        assert!(matches!(decoder.next_frame(), Err(MonitorError::Protocol(_))));
    }
}
