//! The backend interface.
//!
//! One trait carries every operation either backend can perform. Methods a
//! backend type lacks keep the default body, which reports the operation
//! as unsupported; [`crate::Device`] checks the capability table before
//! calling, so the defaults are only reached by direct trait users.

use c64_codec::sid::Note;
use c64_codec::{ByteBuffer, Prg};
use c64u_rest::{ActionOutcome, DriveAction};
use serde_json::Value as JsonValue;

use crate::{BackendKind, Capability, DeviceError};

pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// `host[:port]` of the connected target, for diagnostics.
    fn endpoint(&self) -> String;

    fn info(&self) -> Result<JsonValue, DeviceError>;
    fn read_memory(&self, address: u16, length: usize) -> Result<ByteBuffer, DeviceError>;
    fn write_memory(&self, address: u16, data: &[u8]) -> Result<(), DeviceError>;
    /// Load and start a program.
    fn run_program(&self, prg: &Prg) -> Result<(), DeviceError>;

    // Machine control. The outcome carries whatever details the target
    // reported alongside success.

    fn reset(&self) -> Result<ActionOutcome, DeviceError>;
    /// Stop the CPU until [`Backend::resume`].
    fn pause(&self) -> Result<ActionOutcome, DeviceError>;
    fn resume(&self) -> Result<ActionOutcome, DeviceError>;

    // Emulator only

    fn ping(&self) -> Result<(), DeviceError> {
        Err(unsupported(self.kind(), Capability::Ping))
    }

    /// Type text into the keyboard buffer; `\n` is RETURN.
    fn keyboard_feed(&self, _text: &str) -> Result<(), DeviceError> {
        Err(unsupported(self.kind(), Capability::KeyboardFeed))
    }

    fn hard_reset(&self) -> Result<ActionOutcome, DeviceError> {
        Err(unsupported(self.kind(), Capability::HardReset))
    }

    /// Shut the emulator down.
    fn quit(&self) -> Result<(), DeviceError> {
        Err(unsupported(self.kind(), Capability::Quit))
    }

    // Hardware only

    fn reboot(&self) -> Result<ActionOutcome, DeviceError> {
        Err(unsupported(self.kind(), Capability::Reboot))
    }

    fn poweroff(&self) -> Result<ActionOutcome, DeviceError> {
        Err(unsupported(self.kind(), Capability::PowerOff))
    }

    fn menu_button(&self) -> Result<ActionOutcome, DeviceError> {
        Err(unsupported(self.kind(), Capability::MenuButton))
    }

    fn read_debug_register(&self) -> Result<u8, DeviceError> {
        Err(unsupported(self.kind(), Capability::DebugRegister))
    }

    fn write_debug_register(&self, _value: u8) -> Result<ActionOutcome, DeviceError> {
        Err(unsupported(self.kind(), Capability::DebugRegister))
    }

    fn sid_set_volume(&self, _volume: u8) -> Result<(), DeviceError> {
        Err(unsupported(self.kind(), Capability::Sid))
    }

    fn sid_note_on(&self, _voice: u8, _note: &Note) -> Result<(), DeviceError> {
        Err(unsupported(self.kind(), Capability::Sid))
    }

    fn sid_note_off(&self, _voice: u8) -> Result<(), DeviceError> {
        Err(unsupported(self.kind(), Capability::Sid))
    }

    fn sid_silence_all(&self) -> Result<(), DeviceError> {
        Err(unsupported(self.kind(), Capability::Sid))
    }

    fn sid_reset(&self) -> Result<(), DeviceError> {
        Err(unsupported(self.kind(), Capability::Sid))
    }

    fn drives(&self) -> Result<JsonValue, DeviceError> {
        Err(unsupported(self.kind(), Capability::DriveList))
    }

    fn drive_mount(&self, _drive: &str, _image: &str) -> Result<(), DeviceError> {
        Err(unsupported(self.kind(), Capability::DriveMount))
    }

    fn drive_control(&self, _drive: &str, _action: DriveAction) -> Result<(), DeviceError> {
        Err(unsupported(self.kind(), Capability::DriveControl))
    }

    fn file_info(&self, _path: &str) -> Result<JsonValue, DeviceError> {
        Err(unsupported(self.kind(), Capability::FileInfo))
    }

    fn sidplay(&self, _image: &[u8], _song: Option<u8>) -> Result<(), DeviceError> {
        Err(unsupported(self.kind(), Capability::SidPlay))
    }
}

pub(crate) fn unsupported(backend: BackendKind, operation: Capability) -> DeviceError {
    DeviceError::Unsupported { operation, backend }
}
