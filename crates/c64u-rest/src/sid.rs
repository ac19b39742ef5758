//! SID control expressed as plain memory writes.

use c64_codec::sid::{
    Note, SID_BASE, VOLUME_REGISTER, WRITABLE_REGISTERS, check_volume, control_register, voice_base,
};

use crate::{ActionOutcome, RestClient, RestError};

impl RestClient {
    /// Master volume (0-15). Filter mode bits are cleared.
    pub fn sid_set_volume(&self, volume: u8) -> Result<ActionOutcome, RestError> {
        let volume = check_volume(volume)?;
        self.write_memory(VOLUME_REGISTER, &[volume])
    }

    /// Program all seven registers of `voice` (1-3) and open its gate.
    pub fn sid_note_on(&self, voice: u8, note: &Note) -> Result<ActionOutcome, RestError> {
        let base = voice_base(voice)?;
        let registers = note.registers()?;
        self.write_memory(base, &registers)
    }

    /// Close the gate on `voice` (1-3); the note enters its release phase.
    pub fn sid_note_off(&self, voice: u8) -> Result<ActionOutcome, RestError> {
        let control = control_register(voice)?;
        self.write_memory(control, &[0x00])
    }

    /// Gate off all voices and zero the volume.
    pub fn sid_silence_all(&self) -> Result<ActionOutcome, RestError> {
        for voice in 1..=3 {
            self.sid_note_off(voice)?;
        }
        self.sid_set_volume(0)
    }

    /// Zero every writable register.
    pub fn sid_reset(&self) -> Result<ActionOutcome, RestError> {
        self.write_memory(SID_BASE, &[0u8; WRITABLE_REGISTERS])
    }
}
