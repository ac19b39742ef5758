//! Ultimate-64 / C64U backend.

use c64_codec::sid::Note;
use c64_codec::{ByteBuffer, Prg};
use c64u_rest::{ActionOutcome, DriveAction, RestClient};
use log::debug;
use serde_json::Value as JsonValue;

use crate::{Backend, BackendKind, DeviceError};

pub struct HardwareBackend {
    client: RestClient,
}

impl HardwareBackend {
    #[must_use]
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn client(&self) -> &RestClient {
        &self.client
    }
}

/// Log the details of a call whose outcome the caller does not receive.
fn done(operation: &str, outcome: ActionOutcome) {
    if let Some(details) = outcome.details {
        debug!("{operation}: {details}");
    }
}

impl Backend for HardwareBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Hardware
    }

    fn endpoint(&self) -> String {
        self.client.endpoint().to_string()
    }

    fn info(&self) -> Result<JsonValue, DeviceError> {
        let info = self.client.info()?;
        let mut value = serde_json::to_value(info)
            .map_err(|e| DeviceError::Config(format!("cannot encode device info: {e}")))?;
        if let JsonValue::Object(fields) = &mut value {
            fields.remove("errors");
            fields.insert("backend".into(), BackendKind::Hardware.name().into());
            fields.insert("endpoint".into(), self.endpoint().into());
        }
        Ok(value)
    }

    fn read_memory(&self, address: u16, length: usize) -> Result<ByteBuffer, DeviceError> {
        Ok(self.client.read_memory(address, length)?)
    }

    fn write_memory(&self, address: u16, data: &[u8]) -> Result<(), DeviceError> {
        done("write_memory", self.client.write_memory(address, data)?);
        Ok(())
    }

    /// The runner endpoint resets the machine, loads the image and starts it.
    fn run_program(&self, prg: &Prg) -> Result<(), DeviceError> {
        done("run_prg", self.client.run_prg(&prg.to_bytes())?);
        Ok(())
    }

    fn reset(&self) -> Result<ActionOutcome, DeviceError> {
        Ok(self.client.reset()?)
    }

    fn pause(&self) -> Result<ActionOutcome, DeviceError> {
        Ok(self.client.pause()?)
    }

    fn resume(&self) -> Result<ActionOutcome, DeviceError> {
        Ok(self.client.resume()?)
    }

    fn reboot(&self) -> Result<ActionOutcome, DeviceError> {
        Ok(self.client.reboot()?)
    }

    fn poweroff(&self) -> Result<ActionOutcome, DeviceError> {
        Ok(self.client.poweroff()?)
    }

    fn menu_button(&self) -> Result<ActionOutcome, DeviceError> {
        Ok(self.client.menu_button()?)
    }

    fn read_debug_register(&self) -> Result<u8, DeviceError> {
        Ok(self.client.read_debug_register()?)
    }

    fn write_debug_register(&self, value: u8) -> Result<ActionOutcome, DeviceError> {
        Ok(self.client.write_debug_register(value)?)
    }

    fn sid_set_volume(&self, volume: u8) -> Result<(), DeviceError> {
        done("sid_set_volume", self.client.sid_set_volume(volume)?);
        Ok(())
    }

    fn sid_note_on(&self, voice: u8, note: &Note) -> Result<(), DeviceError> {
        done("sid_note_on", self.client.sid_note_on(voice, note)?);
        Ok(())
    }

    fn sid_note_off(&self, voice: u8) -> Result<(), DeviceError> {
        done("sid_note_off", self.client.sid_note_off(voice)?);
        Ok(())
    }

    fn sid_silence_all(&self) -> Result<(), DeviceError> {
        done("sid_silence_all", self.client.sid_silence_all()?);
        Ok(())
    }

    fn sid_reset(&self) -> Result<(), DeviceError> {
        done("sid_reset", self.client.sid_reset()?);
        Ok(())
    }

    fn drives(&self) -> Result<JsonValue, DeviceError> {
        Ok(self.client.drives()?)
    }

    fn drive_mount(&self, drive: &str, image: &str) -> Result<(), DeviceError> {
        done("drive_mount", self.client.drive_mount(drive, image)?);
        Ok(())
    }

    fn drive_control(&self, drive: &str, action: DriveAction) -> Result<(), DeviceError> {
        done(action.endpoint(), self.client.drive_control(drive, action)?);
        Ok(())
    }

    fn file_info(&self, path: &str) -> Result<JsonValue, DeviceError> {
        Ok(self.client.file_info(path)?)
    }

    fn sidplay(&self, image: &[u8], song: Option<u8>) -> Result<(), DeviceError> {
        done("sidplay", self.client.sidplay(image, song)?);
        Ok(())
    }
}
