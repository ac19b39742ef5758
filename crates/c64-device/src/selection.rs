//! Choosing a backend.
//!
//! Precedence: explicit mode override, then the configuration file (when
//! both backends are configured, hardware wins), then a reachability probe
//! over the default endpoints.

use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;

use crate::{BackendKind, DeviceConfig, DeviceError, Endpoint};

/// Per-candidate connect timeout for the fallback probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Why a backend was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionReason {
    Override,
    ConfigOnly,
    BothConfigured,
    Fallback,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Override => "override",
            Self::ConfigOnly => "config-only",
            Self::BothConfigured => "both-configured",
            Self::Fallback => "fallback",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub kind: BackendKind,
    pub endpoint: Endpoint,
    pub reason: SelectionReason,
}

/// Answers whether something is listening at an endpoint.
pub trait Probe {
    fn reachable(&self, host: &str, port: u16) -> bool;
}

/// Plain TCP connect with a short timeout.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    pub timeout: Duration,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            timeout: PROBE_TIMEOUT,
        }
    }
}

impl Probe for TcpProbe {
    fn reachable(&self, host: &str, port: u16) -> bool {
        let Ok(addrs) = (host, port).to_socket_addrs() else {
            debug!("probe {host}:{port}: name does not resolve");
            return false;
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok())
    }
}

/// Pick a backend. `mode` is the override (usually from `C64_MODE` or a
/// command-line flag).
pub fn select_backend(
    mode: Option<BackendKind>,
    config: &DeviceConfig,
    probe: &dyn Probe,
) -> Result<Selection, DeviceError> {
    let selection = if let Some(kind) = mode {
        Selection {
            kind,
            endpoint: config
                .endpoint(kind)
                .cloned()
                .unwrap_or_else(|| Endpoint::default_for(kind)),
            reason: SelectionReason::Override,
        }
    } else {
        match (&config.hardware, &config.emulator) {
            (Some(hardware), Some(_)) => Selection {
                kind: BackendKind::Hardware,
                endpoint: hardware.clone(),
                reason: SelectionReason::BothConfigured,
            },
            (Some(hardware), None) => Selection {
                kind: BackendKind::Hardware,
                endpoint: hardware.clone(),
                reason: SelectionReason::ConfigOnly,
            },
            (None, Some(emulator)) => Selection {
                kind: BackendKind::Emulator,
                endpoint: emulator.clone(),
                reason: SelectionReason::ConfigOnly,
            },
            (None, None) => probe_defaults(probe)?,
        }
    };

    info!(
        "selected {} backend at {} ({})",
        selection.kind, selection.endpoint.host, selection.reason
    );
    Ok(selection)
}

fn probe_defaults(probe: &dyn Probe) -> Result<Selection, DeviceError> {
    for kind in [BackendKind::Emulator, BackendKind::Hardware] {
        let endpoint = Endpoint::default_for(kind);
        let port = endpoint.port_or_default(kind);
        if probe.reachable(&endpoint.host, port) {
            return Ok(Selection {
                kind,
                endpoint,
                reason: SelectionReason::Fallback,
            });
        }
        debug!("probe: no {kind} at {}:{port}", endpoint.host);
    }
    Err(DeviceError::Config(
        "no backend configured and none reachable at the default endpoints".to_string(),
    ))
}
