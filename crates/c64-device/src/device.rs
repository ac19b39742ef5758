//! The device facade.
//!
//! [`Device`] wraps one backend and gives callers a single operation set.
//! Each call checks the backend type's capability table first, so an
//! operation the backend lacks fails with [`DeviceError::Unsupported`]
//! before any I/O. Everything else is forwarded unchanged.
//!
//! Ordinary operations share a read lock; [`Device::write_verified`] takes
//! the write lock for its pause/compare/write/resume bracket, so concurrent
//! callers wait until the target is running again.

use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use c64_codec::screen::{
    CIA2_PORT_A, DEFAULT_SCREEN_BASE, VIC_MEMORY_POINTER, find_text, render_text, screen_base,
};
use c64_codec::sid::Note;
use c64_codec::{ByteBuffer, Prg, SCREEN_SIZE};
use c64u_rest::{ActionOutcome, DriveAction, RestClient};
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::backend::unsupported;
use crate::{
    Backend, BackendKind, Capability, DeviceError, EmulatorBackend, ExecutionOutcome,
    HardwareBackend, OutcomeValidator, PollConfig, ProgramKind, ScreenReader, Selection,
    VerifyStage,
};

/// Options for [`Device::write_verified`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Bytes the target should currently hold at the address.
    pub expected: Option<ByteBuffer>,
    /// Write anyway when `expected` does not match.
    pub continue_on_mismatch: bool,
}

/// Record of a completed verified write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedWrite {
    pub address: u16,
    pub written: ByteBuffer,
    /// Contents before the write, when an expectation was checked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<ByteBuffer>,
    /// Whether `previous` differed from the expectation.
    pub expectation_mismatch: bool,
}

pub struct Device {
    backend: Box<dyn Backend>,
    bracket: RwLock<()>,
}

impl Device {
    #[must_use]
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    #[must_use]
    pub fn from_boxed(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            bracket: RwLock::new(()),
        }
    }

    /// Connect to the selected backend. The emulator connects immediately;
    /// the hardware client makes no request until the first call.
    pub fn connect(selection: &Selection) -> Result<Self, DeviceError> {
        let host = &selection.endpoint.host;
        let port = selection.endpoint.port_or_default(selection.kind);
        let device = match selection.kind {
            BackendKind::Emulator => Self::new(EmulatorBackend::connect(host, port)?),
            BackendKind::Hardware => Self::new(HardwareBackend::new(RestClient::new(
                host,
                Some(port),
            ))),
        };
        debug!("connected to {} at {}", selection.kind, device.endpoint());
        Ok(device)
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    #[must_use]
    pub fn endpoint(&self) -> String {
        self.backend.endpoint()
    }

    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.kind().supports(capability)
    }

    #[must_use]
    pub fn capabilities(&self) -> &'static [Capability] {
        self.kind().capabilities()
    }

    /// Capability check, then a shared hold on the bracket lock.
    fn enter(&self, capability: Capability) -> Result<RwLockReadGuard<'_, ()>, DeviceError> {
        if !self.supports(capability) {
            return Err(unsupported(self.kind(), capability));
        }
        Ok(self.bracket.read().unwrap_or_else(PoisonError::into_inner))
    }

    // -----------------------------------------------------------------
    // Common operations
    // -----------------------------------------------------------------

    pub fn info(&self) -> Result<JsonValue, DeviceError> {
        let _guard = self.enter(Capability::Info)?;
        self.backend.info()
    }

    pub fn read_memory(&self, address: u16, length: usize) -> Result<ByteBuffer, DeviceError> {
        let _guard = self.enter(Capability::ReadMemory)?;
        self.backend.read_memory(address, length)
    }

    pub fn write_memory(&self, address: u16, data: &[u8]) -> Result<(), DeviceError> {
        let _guard = self.enter(Capability::WriteMemory)?;
        self.backend.write_memory(address, data)
    }

    pub fn run_program(&self, prg: &Prg) -> Result<(), DeviceError> {
        let _guard = self.enter(Capability::RunProgram)?;
        self.backend.run_program(prg)
    }

    pub fn reset(&self) -> Result<ActionOutcome, DeviceError> {
        let _guard = self.enter(Capability::Reset)?;
        self.backend.reset()
    }

    pub fn pause(&self) -> Result<ActionOutcome, DeviceError> {
        let _guard = self.enter(Capability::Pause)?;
        self.backend.pause()
    }

    pub fn resume(&self) -> Result<ActionOutcome, DeviceError> {
        let _guard = self.enter(Capability::Resume)?;
        self.backend.resume()
    }

    // -----------------------------------------------------------------
    // Screen
    // -----------------------------------------------------------------

    /// Raw screen RAM (1000 screen codes) from wherever the VIC-II is
    /// currently showing it.
    pub fn read_screen(&self) -> Result<ByteBuffer, DeviceError> {
        let _guard = self.enter(Capability::ReadScreen)?;
        let base = self.active_screen_base();
        self.backend.read_memory(base, SCREEN_SIZE)
    }

    /// The screen as 25 newline-separated rows, trailing blanks trimmed.
    pub fn read_screen_text(&self) -> Result<String, DeviceError> {
        Ok(render_text(&self.read_screen()?))
    }

    /// Row and column where `needle` first appears on screen.
    pub fn find_screen_text(&self, needle: &str) -> Result<Option<(usize, usize)>, DeviceError> {
        Ok(find_text(&self.read_screen()?, needle))
    }

    fn active_screen_base(&self) -> u16 {
        let registers = self
            .backend
            .read_memory(VIC_MEMORY_POINTER, 1)
            .and_then(|d018| Ok((d018, self.backend.read_memory(CIA2_PORT_A, 1)?)));
        match registers {
            Ok((d018, dd00)) if !d018.is_empty() && !dd00.is_empty() => {
                screen_base(d018[0], dd00[0])
            }
            Ok(_) => DEFAULT_SCREEN_BASE,
            Err(e) => {
                warn!("cannot read video registers, assuming $0400: {e}");
                DEFAULT_SCREEN_BASE
            }
        }
    }

    // -----------------------------------------------------------------
    // Verified writes
    // -----------------------------------------------------------------

    /// Pause, optionally compare against `options.expected`, write, read
    /// back, resume.
    ///
    /// The pause is retried once. A failed expectation aborts before
    /// writing unless `continue_on_mismatch` is set. Resume is attempted
    /// exactly once however the bracket ends; the first error wins.
    pub fn write_verified(
        &self,
        address: u16,
        data: &[u8],
        options: &VerifyOptions,
    ) -> Result<VerifiedWrite, DeviceError> {
        for capability in [
            Capability::Pause,
            Capability::ReadMemory,
            Capability::WriteMemory,
            Capability::Resume,
        ] {
            if !self.supports(capability) {
                return Err(unsupported(self.kind(), capability));
            }
        }
        let _bracket = self.bracket.write().unwrap_or_else(PoisonError::into_inner);

        let result = self.bracketed_write(address, data, options);
        let resumed = self.backend.resume();
        match (result, resumed) {
            (Ok(write), Ok(_)) => Ok(write),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), resumed) => {
                if let Err(resume_error) = resumed {
                    warn!("resume after failed verified write also failed: {resume_error}");
                }
                Err(e)
            }
        }
    }

    fn bracketed_write(
        &self,
        address: u16,
        data: &[u8],
        options: &VerifyOptions,
    ) -> Result<VerifiedWrite, DeviceError> {
        if let Err(first) = self.backend.pause() {
            warn!("pause failed, retrying once: {first}");
            self.backend.pause()?;
        }

        let mut previous = None;
        let mut expectation_mismatch = false;
        if let Some(expected) = options.expected.as_ref().filter(|e| !e.is_empty()) {
            let current = self.backend.read_memory(address, expected.len())?;
            if current != *expected {
                if !options.continue_on_mismatch {
                    return Err(DeviceError::Verification {
                        stage: VerifyStage::PreWrite,
                        address,
                        expected: expected.clone(),
                        actual: current,
                    });
                }
                warn!(
                    "${address:04X} holds {current}, expected {expected}; writing anyway"
                );
                expectation_mismatch = true;
            }
            previous = Some(current);
        }

        self.backend.write_memory(address, data)?;
        let readback = self.backend.read_memory(address, data.len())?;
        if readback.as_slice() != data {
            return Err(DeviceError::Verification {
                stage: VerifyStage::PostWrite,
                address,
                expected: ByteBuffer::from(data),
                actual: readback,
            });
        }

        Ok(VerifiedWrite {
            address,
            written: ByteBuffer::from(data),
            previous,
            expectation_mismatch,
        })
    }

    // -----------------------------------------------------------------
    // Run and validate
    // -----------------------------------------------------------------

    /// Start `prg` and watch the screen for a verdict. `kind` defaults to
    /// BASIC for images loading at `$0801`.
    pub fn run_and_validate(
        &self,
        prg: &Prg,
        kind: Option<ProgramKind>,
        poll: PollConfig,
    ) -> Result<ExecutionOutcome, DeviceError> {
        if !self.supports(Capability::ReadScreen) {
            return Err(unsupported(self.kind(), Capability::ReadScreen));
        }
        self.run_program(prg)?;
        let kind = kind.unwrap_or_else(|| ProgramKind::of(prg));
        Ok(OutcomeValidator::new(poll).validate(self, kind))
    }

    // -----------------------------------------------------------------
    // Emulator extras
    // -----------------------------------------------------------------

    pub fn ping(&self) -> Result<(), DeviceError> {
        let _guard = self.enter(Capability::Ping)?;
        self.backend.ping()
    }

    pub fn keyboard_feed(&self, text: &str) -> Result<(), DeviceError> {
        let _guard = self.enter(Capability::KeyboardFeed)?;
        self.backend.keyboard_feed(text)
    }

    pub fn hard_reset(&self) -> Result<ActionOutcome, DeviceError> {
        let _guard = self.enter(Capability::HardReset)?;
        self.backend.hard_reset()
    }

    pub fn quit(&self) -> Result<(), DeviceError> {
        let _guard = self.enter(Capability::Quit)?;
        self.backend.quit()
    }

    // -----------------------------------------------------------------
    // Hardware extras
    // -----------------------------------------------------------------

    pub fn reboot(&self) -> Result<ActionOutcome, DeviceError> {
        let _guard = self.enter(Capability::Reboot)?;
        self.backend.reboot()
    }

    pub fn poweroff(&self) -> Result<ActionOutcome, DeviceError> {
        let _guard = self.enter(Capability::PowerOff)?;
        self.backend.poweroff()
    }

    pub fn menu_button(&self) -> Result<ActionOutcome, DeviceError> {
        let _guard = self.enter(Capability::MenuButton)?;
        self.backend.menu_button()
    }

    pub fn read_debug_register(&self) -> Result<u8, DeviceError> {
        let _guard = self.enter(Capability::DebugRegister)?;
        self.backend.read_debug_register()
    }

    pub fn write_debug_register(&self, value: u8) -> Result<ActionOutcome, DeviceError> {
        let _guard = self.enter(Capability::DebugRegister)?;
        self.backend.write_debug_register(value)
    }

    pub fn sid_set_volume(&self, volume: u8) -> Result<(), DeviceError> {
        let _guard = self.enter(Capability::Sid)?;
        self.backend.sid_set_volume(volume)
    }

    pub fn sid_note_on(&self, voice: u8, note: &Note) -> Result<(), DeviceError> {
        let _guard = self.enter(Capability::Sid)?;
        self.backend.sid_note_on(voice, note)
    }

    pub fn sid_note_off(&self, voice: u8) -> Result<(), DeviceError> {
        let _guard = self.enter(Capability::Sid)?;
        self.backend.sid_note_off(voice)
    }

    pub fn sid_silence_all(&self) -> Result<(), DeviceError> {
        let _guard = self.enter(Capability::Sid)?;
        self.backend.sid_silence_all()
    }

    pub fn sid_reset(&self) -> Result<(), DeviceError> {
        let _guard = self.enter(Capability::Sid)?;
        self.backend.sid_reset()
    }

    pub fn drives(&self) -> Result<JsonValue, DeviceError> {
        let _guard = self.enter(Capability::DriveList)?;
        self.backend.drives()
    }

    pub fn drive_mount(&self, drive: &str, image: &str) -> Result<(), DeviceError> {
        let _guard = self.enter(Capability::DriveMount)?;
        self.backend.drive_mount(drive, image)
    }

    pub fn drive_control(&self, drive: &str, action: DriveAction) -> Result<(), DeviceError> {
        let _guard = self.enter(Capability::DriveControl)?;
        self.backend.drive_control(drive, action)
    }

    pub fn file_info(&self, path: &str) -> Result<JsonValue, DeviceError> {
        let _guard = self.enter(Capability::FileInfo)?;
        self.backend.file_info(path)
    }

    pub fn sidplay(&self, image: &[u8], song: Option<u8>) -> Result<(), DeviceError> {
        let _guard = self.enter(Capability::SidPlay)?;
        self.backend.sidplay(image, song)
    }
}

impl ScreenReader for Device {
    fn read_screen_text(&self) -> Result<String, DeviceError> {
        Device::read_screen_text(self)
    }
}
