//! VICE backend.
//!
//! Every monitor command stops the emulated CPU until the monitor is
//! exited. Outside a pause, each operation therefore ends with
//! `exit_monitor` so the machine keeps running, whether the operation
//! succeeded or not; between [`Backend::pause`] and [`Backend::resume`] the
//! CPU stays stopped.

use std::sync::atomic::{AtomicBool, Ordering};

use c64_codec::prg::BASIC_POINTERS;
use c64_codec::{ByteBuffer, Prg};
use c64u_rest::ActionOutcome;
use log::{debug, warn};
use serde_json::{Value as JsonValue, json};
use vice_monitor::{MonitorClient, MonitorError};

use crate::{Backend, BackendKind, DeviceError};

pub struct EmulatorBackend {
    client: MonitorClient,
    held: AtomicBool,
}

impl EmulatorBackend {
    #[must_use]
    pub fn new(client: MonitorClient) -> Self {
        Self {
            client,
            held: AtomicBool::new(false),
        }
    }

    pub fn connect(host: &str, port: u16) -> Result<Self, DeviceError> {
        Ok(Self::new(MonitorClient::connect(host, port)?))
    }

    #[must_use]
    pub fn client(&self) -> &MonitorClient {
        &self.client
    }

    /// Let the CPU run again unless the caller is holding it paused.
    fn release(&self) -> Result<(), DeviceError> {
        if !self.held.load(Ordering::Acquire) {
            self.client.exit_monitor()?;
        }
        Ok(())
    }

    /// Release after an operation. The operation's own error takes
    /// precedence over a failed release.
    fn then_release<T>(&self, result: Result<T, DeviceError>) -> Result<T, DeviceError> {
        let released = self.release();
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), released) => {
                if let Err(release_error) = released {
                    warn!("exit_monitor after failed operation also failed: {release_error}");
                }
                Err(e)
            }
        }
    }

    fn inject(&self, prg: &Prg) -> Result<(), DeviceError> {
        self.client.memory_set(prg.load_address, &prg.data, None)?;
        if prg.is_basic() {
            self.client
                .memory_set(BASIC_POINTERS, &prg.basic_pointers(), None)?;
        }
        self.client.keyboard_feed(&prg.launch_command())?;
        Ok(())
    }

    fn control(&self, result: Result<(), MonitorError>) -> Result<ActionOutcome, DeviceError> {
        self.then_release(
            result
                .map(|()| ActionOutcome::ok())
                .map_err(DeviceError::from),
        )
    }
}

impl Backend for EmulatorBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Emulator
    }

    fn endpoint(&self) -> String {
        self.client.peer().to_string()
    }

    fn info(&self) -> Result<JsonValue, DeviceError> {
        let info = self.then_release(self.client.info().map_err(DeviceError::from))?;
        Ok(json!({
            "backend": BackendKind::Emulator,
            "endpoint": self.endpoint(),
            "version": info.version,
            "svn_revision": info.svn_revision,
        }))
    }

    fn read_memory(&self, address: u16, length: usize) -> Result<ByteBuffer, DeviceError> {
        self.then_release(
            self.client
                .memory_get(address, length, None)
                .map_err(DeviceError::from),
        )
    }

    fn write_memory(&self, address: u16, data: &[u8]) -> Result<(), DeviceError> {
        self.then_release(
            self.client
                .memory_set(address, data, None)
                .map_err(DeviceError::from),
        )
    }

    /// Copy the image into RAM and type the launch command. BASIC programs
    /// at `$0801` also get their pointer block patched so `RUN` sees them.
    /// While paused the program starts on the next resume.
    fn run_program(&self, prg: &Prg) -> Result<(), DeviceError> {
        debug!(
            "injecting {} bytes at ${:04X}",
            prg.data.len(),
            prg.load_address
        );
        let injected = self.inject(prg);
        self.then_release(injected)
    }

    fn reset(&self) -> Result<ActionOutcome, DeviceError> {
        self.control(self.client.reset(false))
    }

    /// Any command parks the CPU in the monitor; a ping is the cheapest.
    fn pause(&self) -> Result<ActionOutcome, DeviceError> {
        self.client.ping()?;
        self.held.store(true, Ordering::Release);
        Ok(ActionOutcome::ok())
    }

    fn resume(&self) -> Result<ActionOutcome, DeviceError> {
        self.held.store(false, Ordering::Release);
        self.client.exit_monitor()?;
        Ok(ActionOutcome::ok())
    }

    fn ping(&self) -> Result<(), DeviceError> {
        self.then_release(self.client.ping().map_err(DeviceError::from))
    }

    fn keyboard_feed(&self, text: &str) -> Result<(), DeviceError> {
        self.then_release(self.client.keyboard_feed(text).map_err(DeviceError::from))
    }

    fn hard_reset(&self) -> Result<ActionOutcome, DeviceError> {
        self.control(self.client.reset(true))
    }

    fn quit(&self) -> Result<(), DeviceError> {
        self.client.quit()?;
        Ok(())
    }
}
