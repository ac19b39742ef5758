//! Monitor client failures.

use std::time::Duration;

use thiserror::Error;

use crate::command::{Command, describe_error_code};

/// Everything that can go wrong talking to the monitor.
///
/// `Clone` so a single connection failure can be delivered to every
/// request that was in flight when it happened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// Socket-level failure. The connection is closed afterwards.
    #[error("monitor connection error: {0}")]
    Connection(String),

    /// The client was closed (or never connected) before the request.
    #[error("monitor connection is closed")]
    Closed,

    /// A frame that does not follow the protocol. The connection is torn
    /// down rather than resynchronised.
    #[error("monitor protocol error: {0}")]
    Protocol(String),

    /// No correlated response arrived in time.
    #[error("{command} request #{request_id} timed out after {timeout:?}")]
    Timeout {
        command: Command,
        request_id: u32,
        timeout: Duration,
    },

    /// The monitor answered with a non-zero error code.
    #[error("{command} rejected by monitor: error {code:#04X} ({})", code_name(.code))]
    Command { command: Command, code: u8 },

    /// Arguments rejected locally; nothing was sent.
    #[error("invalid monitor request: {0}")]
    InvalidRequest(String),
}

fn code_name(code: &u8) -> &'static str {
    describe_error_code(*code)
}

impl From<std::io::Error> for MonitorError {
    fn from(e: std::io::Error) -> Self {
        Self::Connection(e.to_string())
    }
}
