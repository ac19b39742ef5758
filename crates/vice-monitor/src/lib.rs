//! Client for the VICE binary monitor.
//!
//! The monitor speaks length-prefixed binary frames over one long-lived
//! TCP connection. Requests carry a locally chosen id which the emulator
//! echoes in its response; unsolicited events (CPU stopped, JAM) carry the
//! id `0xFFFFFFFF`. A background reader thread demultiplexes the two.
//!
//! Any command stops the emulated CPU inside the monitor. Call
//! [`MonitorClient::exit_monitor`] to let time pass on the target.

mod client;
mod command;
mod error;
pub mod frame;

pub use client::{DEFAULT_PORT, DEFAULT_TIMEOUT, MonitorClient, MonitorInfo};
pub use command::{Command, Event, EventKind, describe_error_code, to_petscii};
pub use error::MonitorError;
pub use frame::{FrameDecoder, Request, Response};
