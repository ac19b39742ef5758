//! HTTP control client for real C64 hardware (Ultimate-64 / C64U REST API).
//!
//! Every call is one request/response against `http://<host>[:<port>]/v1`.
//! Requests go through a [`Transport`] so the address/byte encoding and the
//! `errors` envelope handling can be exercised without hardware.

mod client;
mod error;
mod sid;
mod transport;

pub use client::{
    ActionOutcome, DEFAULT_PORT, DEFAULT_TIMEOUT, DeviceInfo, DriveAction, INLINE_WRITE_LIMIT, MachineAction,
    RestClient,
};
pub use error::RestError;
pub use transport::{HttpRequest, HttpResponse, Method, Transport, UreqTransport};
