//! Command and event identifiers.

use std::fmt;

use crate::MonitorError;

/// Commands this client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    MemoryGet = 0x01,
    MemorySet = 0x02,
    KeyboardFeed = 0x72,
    Ping = 0x81,
    Info = 0x85,
    Exit = 0xAA,
    Quit = 0xBB,
    Reset = 0xCC,
}

impl Command {
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            0x01 => Some(Self::MemoryGet),
            0x02 => Some(Self::MemorySet),
            0x72 => Some(Self::KeyboardFeed),
            0x81 => Some(Self::Ping),
            0x85 => Some(Self::Info),
            0xAA => Some(Self::Exit),
            0xBB => Some(Self::Quit),
            0xCC => Some(Self::Reset),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MemoryGet => "memory_get",
            Self::MemorySet => "memory_set",
            Self::KeyboardFeed => "keyboard_feed",
            Self::Ping => "ping",
            Self::Info => "info",
            Self::Exit => "exit",
            Self::Quit => "quit",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unsolicited event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The CPU hit a JAM opcode.
    Jam,
    /// Execution stopped (breakpoint, monitor entry).
    Stopped,
    /// Execution resumed.
    Resumed,
    /// Anything else, by response type byte.
    Other(u8),
}

impl EventKind {
    #[must_use]
    pub const fn from_type(response_type: u8) -> Self {
        match response_type {
            0x61 => Self::Jam,
            0x62 => Self::Stopped,
            0x63 => Self::Resumed,
            other => Self::Other(other),
        }
    }
}

/// An unsolicited notification from the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub body: Vec<u8>,
}

impl Event {
    /// Program counter reported by JAM/stopped/resumed events.
    #[must_use]
    pub fn pc(&self) -> Option<u16> {
        match (self.kind, self.body.as_slice()) {
            (EventKind::Jam | EventKind::Stopped | EventKind::Resumed, [lo, hi, ..]) => {
                Some(u16::from_le_bytes([*lo, *hi]))
            }
            _ => None,
        }
    }
}

/// Human-readable name for a monitor error code.
#[must_use]
pub const fn describe_error_code(code: u8) -> &'static str {
    match code {
        0x00 => "ok",
        0x01 => "object does not exist",
        0x02 => "invalid memspace",
        0x80 => "invalid command length",
        0x81 => "invalid parameter",
        0x82 => "unsupported API version",
        0x83 => "invalid command type",
        0x8F => "general failure",
        _ => "unknown error",
    }
}

/// Convert typed text to the PETSCII the keyboard buffer expects.
///
/// Letters are sent unshifted (uppercase glyphs in the power-on character
/// set) and a newline becomes RETURN.
pub fn to_petscii(text: &str) -> Result<Vec<u8>, MonitorError> {
    text.chars()
        .map(|ch| match ch {
            '\n' | '\r' => Ok(0x0D),
            'a'..='z' => Ok(ch.to_ascii_uppercase() as u8),
            ' '..=']' => Ok(ch as u8),
            _ => Err(MonitorError::InvalidRequest(format!(
                "character {ch:?} cannot be typed"
            ))),
        })
        .collect()
}

/// Memory get/set body prefix: side effects, start, end (inclusive),
/// memspace, bank.
pub(crate) fn memory_range(start: u16, end: u16, bank: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(8);
    body.push(0x00); // no side effects
    body.extend_from_slice(&start.to_le_bytes());
    body.extend_from_slice(&end.to_le_bytes());
    body.push(0x00); // main CPU memspace
    body.extend_from_slice(&bank.to_le_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ids_round_trip() {
        for command in [
            Command::MemoryGet,
            Command::MemorySet,
            Command::KeyboardFeed,
            Command::Ping,
            Command::Info,
            Command::Exit,
            Command::Quit,
            Command::Reset,
        ] {
            assert_eq!(Command::from_id(command.id()), Some(command));
        }
        assert_eq!(Command::from_id(0x99), None);
    }

    #[test]
    fn stopped_event_pc() {
        let event = Event {
            kind: EventKind::from_type(0x62),
            body: vec![0x0D, 0x08],
        };
        assert_eq!(event.kind, EventKind::Stopped);
        assert_eq!(event.pc(), Some(0x080D));
        assert_eq!(EventKind::from_type(0x70), EventKind::Other(0x70));
    }

    #[test]
    fn petscii_conversion() {
        assert_eq!(to_petscii("run\n"), Ok(vec![0x52, 0x55, 0x4E, 0x0D]));
        assert_eq!(to_petscii("SYS 49152"), Ok(b"SYS 49152".to_vec()));
        assert!(to_petscii("~").is_err());
    }

    #[test]
    fn memory_range_layout() {
        assert_eq!(
            memory_range(0x0400, 0x07E7, 0),
            vec![0x00, 0x00, 0x04, 0xE7, 0x07, 0x00, 0x00, 0x00]
        );
    }
}
