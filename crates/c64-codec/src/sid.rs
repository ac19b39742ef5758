//! SID register map and note encoding.
//!
//! # Register map (relative to `$D400`)
//!
//! | Offset     | Register                   |
//! |------------|----------------------------|
//! | $00        | Voice 1 freq lo            |
//! | $01        | Voice 1 freq hi            |
//! | $02        | Voice 1 PW lo              |
//! | $03        | Voice 1 PW hi              |
//! | $04        | Voice 1 control            |
//! | $05        | Voice 1 AD                 |
//! | $06        | Voice 1 SR                 |
//! | $07–$0D    | Voice 2 (same layout)      |
//! | $0E–$14    | Voice 3 (same layout)      |
//! | $15–$16    | Filter cutoff              |
//! | $17        | Filter routing + resonance |
//! | $18        | Volume + filter mode       |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// SID base address.
pub const SID_BASE: u16 = 0xD400;
/// Bytes between consecutive voices.
pub const VOICE_STRIDE: u16 = 7;
/// Offset of the control register within a voice.
pub const CONTROL_OFFSET: u16 = 4;
/// Volume + filter mode register.
pub const VOLUME_REGISTER: u16 = SID_BASE + 0x18;
/// Writable registers ($D400-$D418).
pub const WRITABLE_REGISTERS: usize = 25;

/// PAL CPU clock; the oscillator advances by the frequency register every cycle.
pub const PAL_CLOCK_HZ: f64 = 985_248.0;

const GATE: u8 = 0x01;

/// Oscillator waveform (control register bits 4-7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Triangle,
    Sawtooth,
    Pulse,
    Noise,
}

impl Waveform {
    #[must_use]
    pub const fn control_bits(self) -> u8 {
        match self {
            Self::Triangle => 0x10,
            Self::Sawtooth => 0x20,
            Self::Pulse => 0x40,
            Self::Noise => 0x80,
        }
    }
}

/// Out-of-range SID parameter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SidError {
    #[error("voice must be 1-3, got {0}")]
    Voice(u8),
    #[error("volume must be 0-15, got {0}")]
    Volume(u8),
    #[error("{name} must be 0-15, got {value}")]
    Envelope { name: &'static str, value: u8 },
    #[error("pulse width must be 0-4095, got {0}")]
    PulseWidth(u16),
    #[error("frequency {0} Hz is outside the SID range (0-3848 Hz)")]
    Frequency(f64),
}

/// Everything needed to start a note on one voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub frequency_hz: f64,
    pub waveform: Waveform,
    #[serde(default)]
    pub attack: u8,
    #[serde(default)]
    pub decay: u8,
    #[serde(default = "default_sustain")]
    pub sustain: u8,
    #[serde(default)]
    pub release: u8,
    #[serde(default = "default_pulse_width")]
    pub pulse_width: u16,
}

fn default_sustain() -> u8 {
    15
}

fn default_pulse_width() -> u16 {
    0x0800
}

impl Note {
    #[must_use]
    pub fn new(frequency_hz: f64, waveform: Waveform) -> Self {
        Self {
            frequency_hz,
            waveform,
            attack: 0,
            decay: 0,
            sustain: default_sustain(),
            release: 0,
            pulse_width: default_pulse_width(),
        }
    }

    /// The seven voice registers, freq lo through SR, with the gate set.
    pub fn registers(&self) -> Result<[u8; 7], SidError> {
        let freq = frequency_register(self.frequency_hz)?;
        if self.pulse_width > 0x0FFF {
            return Err(SidError::PulseWidth(self.pulse_width));
        }
        let ad = pack_nibbles("attack", self.attack, "decay", self.decay)?;
        let sr = pack_nibbles("sustain", self.sustain, "release", self.release)?;
        let [freq_lo, freq_hi] = freq.to_le_bytes();
        let [pw_lo, pw_hi] = self.pulse_width.to_le_bytes();
        Ok([
            freq_lo,
            freq_hi,
            pw_lo,
            pw_hi,
            self.waveform.control_bits() | GATE,
            ad,
            sr,
        ])
    }
}

/// Address of a voice's first register.
pub fn voice_base(voice: u8) -> Result<u16, SidError> {
    if !(1..=3).contains(&voice) {
        return Err(SidError::Voice(voice));
    }
    Ok(SID_BASE + u16::from(voice - 1) * VOICE_STRIDE)
}

/// Address of a voice's control register.
pub fn control_register(voice: u8) -> Result<u16, SidError> {
    Ok(voice_base(voice)? + CONTROL_OFFSET)
}

pub fn check_volume(volume: u8) -> Result<u8, SidError> {
    if volume > 15 {
        return Err(SidError::Volume(volume));
    }
    Ok(volume)
}

/// Oscillator frequency register for a pitch in Hz (PAL timing).
pub fn frequency_register(hz: f64) -> Result<u16, SidError> {
    if !hz.is_finite() || hz < 0.0 {
        return Err(SidError::Frequency(hz));
    }
    let value = (hz * f64::from(1u32 << 24) / PAL_CLOCK_HZ).round();
    if value > f64::from(u16::MAX) {
        return Err(SidError::Frequency(hz));
    }
    Ok(value as u16)
}

fn pack_nibbles(
    high_name: &'static str,
    high: u8,
    low_name: &'static str,
    low: u8,
) -> Result<u8, SidError> {
    for (name, value) in [(high_name, high), (low_name, low)] {
        if value > 15 {
            return Err(SidError::Envelope { name, value });
        }
    }
    Ok((high << 4) | low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_bases() {
        assert_eq!(voice_base(1), Ok(0xD400));
        assert_eq!(voice_base(2), Ok(0xD407));
        assert_eq!(voice_base(3), Ok(0xD40E));
        assert_eq!(voice_base(0), Err(SidError::Voice(0)));
        assert_eq!(voice_base(4), Err(SidError::Voice(4)));
        assert_eq!(control_register(3), Ok(0xD412));
    }

    #[test]
    fn concert_a_frequency() {
        // 440 Hz * 2^24 / 985248 = 7492.5
        assert_eq!(frequency_register(440.0), Ok(7493));
        assert_eq!(frequency_register(0.0), Ok(0));
        assert!(frequency_register(3900.0).is_err());
        assert!(frequency_register(-1.0).is_err());
        assert!(frequency_register(f64::NAN).is_err());
    }

    #[test]
    fn note_registers() {
        let mut note = Note::new(440.0, Waveform::Sawtooth);
        note.attack = 2;
        note.decay = 9;
        note.sustain = 10;
        note.release = 4;
        let regs = note.registers().expect("valid note");
        assert_eq!(regs, [0x45, 0x1D, 0x00, 0x08, 0x21, 0x29, 0xA4]);
    }

    #[test]
    fn note_rejects_out_of_range_parameters() {
        let mut note = Note::new(440.0, Waveform::Pulse);
        note.attack = 16;
        assert_eq!(
            note.registers(),
            Err(SidError::Envelope {
                name: "attack",
                value: 16
            })
        );

        let mut note = Note::new(440.0, Waveform::Pulse);
        note.pulse_width = 0x1000;
        assert_eq!(note.registers(), Err(SidError::PulseWidth(0x1000)));
    }

    #[test]
    fn volume_range() {
        assert_eq!(check_volume(15), Ok(15));
        assert_eq!(check_volume(16), Err(SidError::Volume(16)));
    }
}
