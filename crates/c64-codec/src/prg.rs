//! PRG program images.
//!
//! A PRG file is the simplest C64 binary format: a 2-byte little-endian
//! load address followed by the data bytes. Programs loaded at `$0801`
//! are tokenised BASIC (possibly a `SYS` stub in front of machine code);
//! anything else is started with `SYS <load address>`.

use crate::ParseError;

/// Start of BASIC program text.
pub const BASIC_START: u16 = 0x0801;

/// Zero-page home of the BASIC pointer block (TXTTAB, VARTAB, ARYTAB, STREND).
pub const BASIC_POINTERS: u16 = 0x002B;

/// A parsed PRG image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prg {
    pub load_address: u16,
    pub data: Vec<u8>,
}

impl Prg {
    /// Split a PRG file into load address and data.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 3 {
            return Err(ParseError::PrgTooShort { len: bytes.len() });
        }

        let load_address = u16::from_le_bytes([bytes[0], bytes[1]]);
        let data = bytes[2..].to_vec();
        if usize::from(load_address) + data.len() > 0x1_0000 {
            return Err(ParseError::PrgOverflow {
                load_address,
                len: data.len(),
            });
        }

        Ok(Self { load_address, data })
    }

    /// Reassemble the file form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 2);
        out.extend_from_slice(&self.load_address.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// First address past the loaded data.
    #[must_use]
    pub fn end_address(&self) -> u16 {
        self.load_address.wrapping_add(self.data.len() as u16)
    }

    #[must_use]
    pub fn is_basic(&self) -> bool {
        self.load_address == BASIC_START
    }

    /// The 8-byte pointer block to write at [`BASIC_POINTERS`] so the
    /// interpreter sees the program: TXTTAB at the load address, VARTAB,
    /// ARYTAB and STREND at the end of the program text.
    #[must_use]
    pub fn basic_pointers(&self) -> [u8; 8] {
        let start = self.load_address.to_le_bytes();
        let end = self.end_address().to_le_bytes();
        [
            start[0], start[1], end[0], end[1], end[0], end[1], end[0], end[1],
        ]
    }

    /// What to type at the READY prompt to start this program.
    #[must_use]
    pub fn launch_command(&self) -> String {
        if self.is_basic() {
            "RUN\n".to_string()
        } else {
            format!("SYS {}\n", self.load_address)
        }
    }
}
