//! The hardware control client.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use c64_codec::{ByteBuffer, parse_bytes};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{HttpRequest, HttpResponse, RestError, Transport, UreqTransport};

/// Port the Ultimate web server listens on.
pub const DEFAULT_PORT: u16 = 80;
/// Request timeout for the `ureq` transport.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Largest write sent inline as a hex query parameter; anything longer
/// goes as a binary body.
pub const INLINE_WRITE_LIMIT: usize = 128;

const OCTET_STREAM: &str = "application/octet-stream";
const JSON: &str = "application/json";
const ADDRESS_SPACE: usize = 0x1_0000;

/// Result of a control call that succeeded. `details` is whatever the
/// device sent back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl ActionOutcome {
    /// A success with nothing to report.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            details: None,
        }
    }
}

/// `GET /v1/info`. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub fpga_version: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Whole-machine control actions (`PUT /v1/machine:<action>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineAction {
    Reset,
    Reboot,
    Pause,
    Resume,
    PowerOff,
    MenuButton,
}

impl MachineAction {
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Reboot => "reboot",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::PowerOff => "poweroff",
            Self::MenuButton => "menu_button",
        }
    }
}

/// Per-drive actions (`PUT /v1/drives/<id>:<action>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveAction {
    Remove,
    Reset,
    On,
    Off,
}

impl DriveAction {
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Remove => "remove",
            Self::Reset => "reset",
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

/// Blocking client for the `/v1` REST API.
pub struct RestClient {
    transport: Box<dyn Transport>,
    endpoint: String,
}

impl RestClient {
    /// Client over an arbitrary transport. `endpoint` is only used in logs
    /// and diagnostics.
    #[must_use]
    pub fn with_transport(transport: impl Transport + 'static, endpoint: impl Into<String>) -> Self {
        Self {
            transport: Box::new(transport),
            endpoint: endpoint.into(),
        }
    }

    /// Client for `http://host[:port]`. No request is made until the first
    /// call.
    #[must_use]
    pub fn new(host: &str, port: Option<u16>) -> Self {
        Self::with_timeout(host, port, DEFAULT_TIMEOUT)
    }

    #[must_use]
    pub fn with_timeout(host: &str, port: Option<u16>, timeout: Duration) -> Self {
        let endpoint = match port {
            Some(port) if port != DEFAULT_PORT => format!("{host}:{port}"),
            _ => host.to_string(),
        };
        let transport = UreqTransport::new(format!("http://{endpoint}"), timeout);
        Self::with_transport(transport, endpoint)
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    // -----------------------------------------------------------------
    // Identification
    // -----------------------------------------------------------------

    /// API version string.
    pub fn version(&self) -> Result<String, RestError> {
        let body = self.json("version", &HttpRequest::get("/v1/version"))?;
        body.get("version")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| RestError::decode("version", "missing \"version\" field"))
    }

    pub fn info(&self) -> Result<DeviceInfo, RestError> {
        let body = self.json("info", &HttpRequest::get("/v1/info"))?;
        serde_json::from_value(body).map_err(|e| RestError::decode("info", e.to_string()))
    }

    // -----------------------------------------------------------------
    // Memory
    // -----------------------------------------------------------------

    /// Read `length` bytes starting at `address`.
    ///
    /// Binary is requested first. A device that answers with JSON (either
    /// because it ignored `Accept` or refused it with 406) is decoded from
    /// its `data` (base64) or `hex` field.
    pub fn read_memory(&self, address: u16, length: usize) -> Result<ByteBuffer, RestError> {
        if length == 0 {
            return Err(RestError::validation(
                "read_memory",
                "length must be a positive integer",
            ));
        }
        if usize::from(address) + length > ADDRESS_SPACE {
            return Err(RestError::validation(
                "read_memory",
                format!("{length} bytes from ${address:04X} runs past $FFFF"),
            ));
        }

        let request = |accept: &str| {
            HttpRequest::get("/v1/machine:readmem")
                .query("address", format!("{address:04X}"))
                .query("length", length.to_string())
                .accept(accept)
        };

        let mut response = self.transport.execute(&request(OCTET_STREAM))?;
        if response.status == 406 || response.status == 415 {
            debug!("{}: binary read refused, retrying as JSON", self.endpoint);
            response = self.transport.execute(&request(JSON))?;
        }
        check_status("read_memory", &response)?;

        let bytes = if response.is_json() {
            decode_memory_json(&response.body)?
        } else {
            response.body
        };
        if bytes.len() != length {
            return Err(RestError::decode(
                "read_memory",
                format!("asked for {length} bytes, got {}", bytes.len()),
            ));
        }
        Ok(ByteBuffer::new(bytes))
    }

    /// Write `data` at `address`. Small writes travel as a hex parameter,
    /// larger ones as an octet-stream body.
    pub fn write_memory(&self, address: u16, data: &[u8]) -> Result<ActionOutcome, RestError> {
        if data.is_empty() {
            return Err(RestError::validation("write_memory", "no bytes to write"));
        }
        if usize::from(address) + data.len() > ADDRESS_SPACE {
            return Err(RestError::validation(
                "write_memory",
                format!("{} bytes at ${address:04X} runs past $FFFF", data.len()),
            ));
        }

        let address = format!("{address:04X}");
        let request = if data.len() <= INLINE_WRITE_LIMIT {
            HttpRequest::put("/v1/machine:writemem")
                .query("address", address)
                .query("data", ByteBuffer::from(data).to_hex())
        } else {
            HttpRequest::post("/v1/machine:writemem")
                .query("address", address)
                .body(data.to_vec())
        };
        self.action("write_memory", &request)
    }

    // -----------------------------------------------------------------
    // Machine control
    // -----------------------------------------------------------------

    pub fn machine(&self, action: MachineAction) -> Result<ActionOutcome, RestError> {
        let path = format!("/v1/machine:{}", action.endpoint());
        self.action(action.endpoint(), &HttpRequest::put(path))
    }

    pub fn reset(&self) -> Result<ActionOutcome, RestError> {
        self.machine(MachineAction::Reset)
    }

    pub fn reboot(&self) -> Result<ActionOutcome, RestError> {
        self.machine(MachineAction::Reboot)
    }

    pub fn pause(&self) -> Result<ActionOutcome, RestError> {
        self.machine(MachineAction::Pause)
    }

    pub fn resume(&self) -> Result<ActionOutcome, RestError> {
        self.machine(MachineAction::Resume)
    }

    pub fn poweroff(&self) -> Result<ActionOutcome, RestError> {
        self.machine(MachineAction::PowerOff)
    }

    pub fn menu_button(&self) -> Result<ActionOutcome, RestError> {
        self.machine(MachineAction::MenuButton)
    }

    /// Current value of the debug register (`$D7FF` on the Ultimate).
    pub fn read_debug_register(&self) -> Result<u8, RestError> {
        let body = self.json("debugreg", &HttpRequest::get("/v1/machine:debugreg"))?;
        let value = body
            .get("value")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| RestError::decode("debugreg", "missing \"value\" field"))?;
        match parse_bytes(value)?.as_slice() {
            [byte] => Ok(*byte),
            other => Err(RestError::decode(
                "debugreg",
                format!("expected one byte, got {}", other.len()),
            )),
        }
    }

    pub fn write_debug_register(&self, value: u8) -> Result<ActionOutcome, RestError> {
        let request = HttpRequest::put("/v1/machine:debugreg").query("value", format!("{value:02X}"));
        self.action("debugreg", &request)
    }

    // -----------------------------------------------------------------
    // Runners
    // -----------------------------------------------------------------

    /// Upload a PRG image (load address included); the device resets,
    /// loads and runs it.
    pub fn run_prg(&self, image: &[u8]) -> Result<ActionOutcome, RestError> {
        if image.len() < 3 {
            return Err(RestError::validation(
                "run_prg",
                "a PRG needs a load address and at least one byte",
            ));
        }
        let request = HttpRequest::post("/v1/runners:run_prg").body(image.to_vec());
        self.action("run_prg", &request)
    }

    /// Upload and play a SID tune. `song` selects a sub-tune (1-based).
    pub fn sidplay(&self, image: &[u8], song: Option<u8>) -> Result<ActionOutcome, RestError> {
        if image.is_empty() {
            return Err(RestError::validation("sidplay", "empty SID file"));
        }
        let mut request = HttpRequest::post("/v1/runners:sidplay").body(image.to_vec());
        if let Some(song) = song {
            request = request.query("songnr", song.to_string());
        }
        self.action("sidplay", &request)
    }

    // -----------------------------------------------------------------
    // Drives and files
    // -----------------------------------------------------------------

    /// Drive list as reported by the device.
    pub fn drives(&self) -> Result<JsonValue, RestError> {
        self.json("drives", &HttpRequest::get("/v1/drives"))
    }

    /// Mount a disk image (a path on the device's own storage).
    pub fn drive_mount(&self, drive: &str, image: &str) -> Result<ActionOutcome, RestError> {
        check_drive(drive)?;
        if image.is_empty() {
            return Err(RestError::validation("drive_mount", "image path is empty"));
        }
        let request =
            HttpRequest::put(format!("/v1/drives/{drive}:mount")).query("image", image);
        self.action("drive_mount", &request)
    }

    pub fn drive_control(&self, drive: &str, action: DriveAction) -> Result<ActionOutcome, RestError> {
        check_drive(drive)?;
        let request = HttpRequest::put(format!("/v1/drives/{drive}:{}", action.endpoint()));
        self.action(action.endpoint(), &request)
    }

    /// Metadata for a file on the device's storage.
    pub fn file_info(&self, path: &str) -> Result<JsonValue, RestError> {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return Err(RestError::validation("file_info", "path is empty"));
        }
        let request = HttpRequest::get(format!("/v1/files/{}:info", encode_path(path)));
        self.json("file_info", &request)
    }

    // -----------------------------------------------------------------
    // Envelope handling
    // -----------------------------------------------------------------

    /// Execute a control call and apply the `errors` envelope.
    pub(crate) fn action(
        &self,
        operation: &str,
        request: &HttpRequest,
    ) -> Result<ActionOutcome, RestError> {
        let response = self.transport.execute(request)?;
        let details = response_details(&response);
        if response.is_success() && !reports_errors(details.as_ref()) {
            return Ok(ActionOutcome {
                success: true,
                details,
            });
        }
        warn!(
            "{}: {operation} failed with HTTP {}",
            self.endpoint, response.status
        );
        Err(RestError::Execution {
            operation: operation.to_string(),
            status: response.status,
            details,
        })
    }

    /// Execute a query and return its JSON body.
    fn json(&self, operation: &'static str, request: &HttpRequest) -> Result<JsonValue, RestError> {
        let request = request.clone().accept(JSON);
        let response = self.transport.execute(&request)?;
        check_status(operation, &response)?;
        let body: JsonValue = serde_json::from_slice(&response.body)
            .map_err(|e| RestError::decode(operation, e.to_string()))?;
        if reports_errors(Some(&body)) {
            return Err(RestError::Execution {
                operation: operation.to_string(),
                status: response.status,
                details: Some(body),
            });
        }
        Ok(body)
    }
}

fn check_status(operation: &str, response: &HttpResponse) -> Result<(), RestError> {
    if response.is_success() {
        return Ok(());
    }
    Err(RestError::Execution {
        operation: operation.to_string(),
        status: response.status,
        details: response_details(response),
    })
}

/// Body as details: JSON if it parses, otherwise the text, otherwise absent.
fn response_details(response: &HttpResponse) -> Option<JsonValue> {
    if response.body.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_slice::<JsonValue>(&response.body) {
        return Some(value);
    }
    let text = String::from_utf8_lossy(&response.body).trim().to_string();
    (!text.is_empty()).then_some(JsonValue::String(text))
}

/// A non-empty `errors` array or an explicit `"success": false`.
fn reports_errors(details: Option<&JsonValue>) -> bool {
    let Some(JsonValue::Object(body)) = details else {
        return false;
    };
    let errors = body
        .get("errors")
        .and_then(JsonValue::as_array)
        .is_some_and(|errors| !errors.is_empty());
    let refused = body.get("success") == Some(&JsonValue::Bool(false));
    errors || refused
}

fn decode_memory_json(body: &[u8]) -> Result<Vec<u8>, RestError> {
    let value: JsonValue =
        serde_json::from_slice(body).map_err(|e| RestError::decode("read_memory", e.to_string()))?;
    if let Some(data) = value.get("data").and_then(JsonValue::as_str) {
        return BASE64
            .decode(data)
            .map_err(|e| RestError::decode("read_memory", format!("bad base64: {e}")));
    }
    if let Some(hex) = value.get("hex").and_then(JsonValue::as_str) {
        return Ok(parse_bytes(hex)?.into_vec());
    }
    Err(RestError::decode(
        "read_memory",
        "JSON body has neither \"data\" nor \"hex\"",
    ))
}

fn check_drive(drive: &str) -> Result<(), RestError> {
    if drive.is_empty() || !drive.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(RestError::validation(
            "drive",
            format!("drive id {drive:?} must be alphanumeric"),
        ));
    }
    Ok(())
}

/// Percent-encode a path, keeping `/` separators.
fn encode_path(path: &str) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(char::from(byte));
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}
