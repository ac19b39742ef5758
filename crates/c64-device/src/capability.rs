//! Backend kinds and what each one can do.
//!
//! The tables are per backend *type*: every emulator connection supports
//! exactly the same operations, and so does every hardware connection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DeviceError;

/// Environment variable that forces a backend.
pub const MODE_ENV: &str = "C64_MODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Ultimate-64 / C64U over HTTP.
    Hardware,
    /// VICE over the binary monitor.
    Emulator,
}

impl BackendKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hardware => "hardware",
            Self::Emulator => "emulator",
        }
    }

    /// Operations this backend type supports.
    #[must_use]
    pub const fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::Hardware => HARDWARE_CAPABILITIES,
            Self::Emulator => EMULATOR_CAPABILITIES,
        }
    }

    #[must_use]
    pub fn supports(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Backend forced through `C64_MODE`, if set. An unrecognised value is
    /// an error rather than silently ignored.
    pub fn from_env() -> Result<Option<Self>, DeviceError> {
        match std::env::var(MODE_ENV) {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => value.parse().map(Some),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(DeviceError::Config(format!(
                "{MODE_ENV} is not valid UTF-8"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hardware" | "u64" | "c64u" => Ok(Self::Hardware),
            "emulator" | "vice" => Ok(Self::Emulator),
            other => Err(DeviceError::Config(format!(
                "unknown backend mode {other:?} (expected hardware or emulator)"
            ))),
        }
    }
}

/// Every operation the facade exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Info,
    ReadMemory,
    WriteMemory,
    RunProgram,
    ReadScreen,
    Reset,
    Pause,
    Resume,
    Ping,
    KeyboardFeed,
    HardReset,
    Quit,
    Reboot,
    #[serde(rename = "poweroff")]
    PowerOff,
    MenuButton,
    DebugRegister,
    Sid,
    DriveList,
    DriveMount,
    DriveControl,
    FileInfo,
    #[serde(rename = "sidplay")]
    SidPlay,
}

impl Capability {
    pub const ALL: [Self; 22] = [
        Self::Info,
        Self::ReadMemory,
        Self::WriteMemory,
        Self::RunProgram,
        Self::ReadScreen,
        Self::Reset,
        Self::Pause,
        Self::Resume,
        Self::Ping,
        Self::KeyboardFeed,
        Self::HardReset,
        Self::Quit,
        Self::Reboot,
        Self::PowerOff,
        Self::MenuButton,
        Self::DebugRegister,
        Self::Sid,
        Self::DriveList,
        Self::DriveMount,
        Self::DriveControl,
        Self::FileInfo,
        Self::SidPlay,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::ReadMemory => "readMemory",
            Self::WriteMemory => "writeMemory",
            Self::RunProgram => "runProgram",
            Self::ReadScreen => "readScreen",
            Self::Reset => "reset",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Ping => "ping",
            Self::KeyboardFeed => "keyboardFeed",
            Self::HardReset => "hardReset",
            Self::Quit => "quit",
            Self::Reboot => "reboot",
            Self::PowerOff => "poweroff",
            Self::MenuButton => "menuButton",
            Self::DebugRegister => "debugRegister",
            Self::Sid => "sid",
            Self::DriveList => "driveList",
            Self::DriveMount => "driveMount",
            Self::DriveControl => "driveControl",
            Self::FileInfo => "fileInfo",
            Self::SidPlay => "sidplay",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const EMULATOR_CAPABILITIES: &[Capability] = &[
    Capability::Info,
    Capability::ReadMemory,
    Capability::WriteMemory,
    Capability::RunProgram,
    Capability::ReadScreen,
    Capability::Reset,
    Capability::Pause,
    Capability::Resume,
    Capability::Ping,
    Capability::KeyboardFeed,
    Capability::HardReset,
    Capability::Quit,
];

const HARDWARE_CAPABILITIES: &[Capability] = &[
    Capability::Info,
    Capability::ReadMemory,
    Capability::WriteMemory,
    Capability::RunProgram,
    Capability::ReadScreen,
    Capability::Reset,
    Capability::Pause,
    Capability::Resume,
    Capability::Reboot,
    Capability::PowerOff,
    Capability::MenuButton,
    Capability::DebugRegister,
    Capability::Sid,
    Capability::DriveList,
    Capability::DriveMount,
    Capability::DriveControl,
    Capability::FileInfo,
    Capability::SidPlay,
];
