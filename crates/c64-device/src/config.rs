//! Connection settings and poll cadence.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BackendKind, DeviceError};

/// Default emulator endpoint: VICE with `-binarymonitor` on this machine.
pub const DEFAULT_EMULATOR_HOST: &str = "127.0.0.1";
/// Default hardware endpoint: the Ultimate's mDNS name.
pub const DEFAULT_HARDWARE_HOST: &str = "c64u.local";

/// Where a backend lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Endpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The well-known endpoint for a backend kind.
    #[must_use]
    pub fn default_for(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Emulator => Self::new(DEFAULT_EMULATOR_HOST, None),
            BackendKind::Hardware => Self::new(DEFAULT_HARDWARE_HOST, None),
        }
    }

    /// Port, filling in the backend's default.
    #[must_use]
    pub fn port_or_default(&self, kind: BackendKind) -> u16 {
        self.port.unwrap_or(match kind {
            BackendKind::Emulator => vice_monitor::DEFAULT_PORT,
            BackendKind::Hardware => c64u_rest::DEFAULT_PORT,
        })
    }
}

/// How often and for how long to poll the screen after launching a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Total budget.
    #[serde(rename = "max_ms", with = "millis")]
    pub max: Duration,
    /// Pause between probes.
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,
}

impl PollConfig {
    #[must_use]
    pub const fn new(max: Duration, interval: Duration) -> Self {
        Self { max, interval }
    }

    /// Shorter cadence for automated runs against a fast target.
    #[must_use]
    pub const fn quick() -> Self {
        Self::new(Duration::from_millis(3000), Duration::from_millis(50))
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_millis(250))
    }
}

/// Backend settings, typically loaded from a JSON file.
///
/// ```json
/// { "hardware": { "host": "192.168.1.64" },
///   "emulator": { "host": "127.0.0.1", "port": 6502 },
///   "poll": { "max_ms": 5000, "interval_ms": 100 } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emulator: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollConfig>,
}

impl DeviceConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| DeviceError::io(path, e))?;
        Self::from_json(&text)
            .map_err(|e| DeviceError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_json(text: &str) -> Result<Self, DeviceError> {
        serde_json::from_str(text).map_err(|e| DeviceError::Config(e.to_string()))
    }

    /// Configured endpoint for `kind`, if any.
    #[must_use]
    pub fn endpoint(&self, kind: BackendKind) -> Option<&Endpoint> {
        match kind {
            BackendKind::Hardware => self.hardware.as_ref(),
            BackendKind::Emulator => self.emulator.as_ref(),
        }
    }

    /// Poll cadence, falling back to `fallback` when the file has none.
    #[must_use]
    pub fn poll_or(&self, fallback: PollConfig) -> PollConfig {
        self.poll.unwrap_or(fallback)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
