//! One control surface over a Commodore 64, real or emulated.
//!
//! Two backends sit behind the [`Backend`] trait: the VICE binary monitor
//! ([`EmulatorBackend`]) and the Ultimate-64 REST interface
//! ([`HardwareBackend`]). [`select_backend`] picks one from an override,
//! the configuration file or a reachability probe, and [`Device`] wraps it
//! with capability checks, screen reading, verified writes and program
//! outcome validation. [`TaskRunner`] repeats device operations in the
//! background.

mod backend;
pub mod capability;
pub mod config;
mod device;
mod emulator;
mod error;
mod hardware;
pub mod selection;
pub mod tasks;
pub mod validator;

pub use backend::Backend;
pub use c64u_rest::ActionOutcome;
pub use capability::{BackendKind, Capability, MODE_ENV};
pub use config::{DeviceConfig, Endpoint, PollConfig};
pub use device::{Device, VerifiedWrite, VerifyOptions};
pub use emulator::EmulatorBackend;
pub use error::{DeviceError, ErrorKind, VerifyStage};
pub use hardware::HardwareBackend;
pub use selection::{Probe, Selection, SelectionReason, TcpProbe, select_backend};
pub use tasks::{TaskOperation, TaskRecord, TaskRunner, TaskStatus, TaskStore};
pub use validator::{
    CancelToken, ExecutionOutcome, OutcomeStatus, OutcomeValidator, ProgramKind, ScreenReader,
};
