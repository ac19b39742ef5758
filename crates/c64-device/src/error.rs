//! Facade-level errors.

use std::io;
use std::path::PathBuf;

use c64_codec::{ByteBuffer, ParseError, format_address};
use c64u_rest::RestError;
use thiserror::Error;
use vice_monitor::MonitorError;

use crate::{BackendKind, Capability};

/// Broad failure class, for callers that branch on what went wrong rather
/// than on which layer reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input, rejected before any I/O.
    Parse,
    /// Malformed frame or undecodable response.
    Protocol,
    Timeout,
    Transport,
    Unsupported,
    /// The target answered and refused.
    Execution,
    Verification,
    Config,
    Task,
    Io,
}

/// Which side of the verified write found the mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStage {
    /// Current contents did not match the caller's expectation.
    PreWrite,
    /// Read-back did not match what was written.
    PostWrite,
}

impl VerifyStage {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PreWrite => "pre-write",
            Self::PostWrite => "post-write",
        }
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("emulator: {0}")]
    Monitor(#[from] MonitorError),

    #[error("hardware: {0}")]
    Rest(#[from] RestError),

    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        operation: Capability,
        backend: BackendKind,
    },

    #[error(
        "{} verification failed at {}: expected {expected}, found {actual}",
        .stage.name(),
        format_address(*.address)
    )]
    Verification {
        stage: VerifyStage,
        address: u16,
        expected: ByteBuffer,
        actual: ByteBuffer,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task {name}: {reason}")]
    Task { name: String, reason: String },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DeviceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) => ErrorKind::Parse,
            Self::Monitor(err) => match err {
                MonitorError::Connection(_) | MonitorError::Closed => ErrorKind::Transport,
                MonitorError::Protocol(_) => ErrorKind::Protocol,
                MonitorError::Timeout { .. } => ErrorKind::Timeout,
                MonitorError::Command { .. } => ErrorKind::Execution,
                MonitorError::InvalidRequest(_) => ErrorKind::Parse,
            },
            Self::Rest(err) => match err {
                RestError::Validation { .. } | RestError::Parse(_) | RestError::Sid(_) => {
                    ErrorKind::Parse
                }
                RestError::Transport(_) => ErrorKind::Transport,
                RestError::Execution { .. } => ErrorKind::Execution,
                RestError::Decode { .. } => ErrorKind::Protocol,
            },
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Verification { .. } => ErrorKind::Verification,
            Self::Config(_) => ErrorKind::Config,
            Self::Task { .. } => ErrorKind::Task,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_underlying_failure() {
        let timeout = DeviceError::from(MonitorError::Timeout {
            command: vice_monitor::Command::Ping,
            request_id: 3,
            timeout: std::time::Duration::from_secs(1),
        });
        assert_eq!(timeout.kind(), ErrorKind::Timeout);

        let protocol = DeviceError::from(MonitorError::Protocol("bad STX".into()));
        assert_eq!(protocol.kind(), ErrorKind::Protocol);

        let refused = DeviceError::from(RestError::Execution {
            operation: "pause".into(),
            status: 500,
            details: None,
        });
        assert_eq!(refused.kind(), ErrorKind::Execution);

        let parse = DeviceError::from(ParseError::NoHexDigits);
        assert_eq!(parse.kind(), ErrorKind::Parse);
    }

    #[test]
    fn unsupported_names_operation_and_backend() {
        let err = DeviceError::Unsupported {
            operation: Capability::DriveMount,
            backend: BackendKind::Emulator,
        };
        assert_eq!(
            err.to_string(),
            "driveMount is not supported by the emulator backend"
        );
    }

    #[test]
    fn verification_message() {
        let err = DeviceError::Verification {
            stage: VerifyStage::PostWrite,
            address: 0xD020,
            expected: ByteBuffer::from([0x06]),
            actual: ByteBuffer::from([0x0E]),
        };
        assert_eq!(
            err.to_string(),
            "post-write verification failed at $D020: expected $06, found $0E"
        );
    }
}
