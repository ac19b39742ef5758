//! Transport-independent encodings shared by both C64 control backends.
//!
//! Addresses and byte payloads arrive as text in several notations
//! (`$0400`, `0x0400`, `%10000000000`, `1024`, `screen`). Everything is
//! normalised here before any I/O happens, so a malformed argument never
//! reaches the wire.

mod address;
mod bytes;
mod error;
pub mod prg;
pub mod screen;
pub mod sid;

pub use address::{SYMBOLS, format_address, parse_address};
pub use bytes::{ByteBuffer, format_bytes, parse_bytes};
pub use error::ParseError;
pub use prg::{BASIC_START, Prg};
pub use screen::{SCREEN_COLS, SCREEN_ROWS, SCREEN_SIZE};
