//! Text-screen decoding.
//!
//! Screen RAM holds screen codes, not PETSCII: 0-31 = @A-Z[\]^_, 32-63 =
//! space to ?, with bit 7 selecting reverse video. Only the uppercase /
//! graphics character set is rendered; graphics glyphs become spaces.

/// Columns on the text screen.
pub const SCREEN_COLS: usize = 40;
/// Rows on the text screen.
pub const SCREEN_ROWS: usize = 25;
/// Bytes of screen RAM.
pub const SCREEN_SIZE: usize = SCREEN_COLS * SCREEN_ROWS;

/// Power-on screen location.
pub const DEFAULT_SCREEN_BASE: u16 = 0x0400;

/// VIC-II memory pointer register.
pub const VIC_MEMORY_POINTER: u16 = 0xD018;
/// CIA2 port A; the low two bits select the VIC bank (inverted).
pub const CIA2_PORT_A: u16 = 0xDD00;

/// Convert a screen code to an ASCII character.
#[must_use]
pub fn screen_code_to_ascii(code: u8) -> char {
    // Reverse-video codes render the same glyph.
    let code = code & 0x7F;
    match code {
        0x00 => '@',
        0x01..=0x1A => (b'A' + code - 1) as char,
        0x1B => '[',
        0x1C => '\\',
        0x1D => ']',
        0x1E => '^',
        0x1F => '_',
        0x20..=0x3F => (b' ' + code - 0x20) as char,
        _ => ' ',
    }
}

/// Convert an ASCII character to its screen code, if it has one.
#[must_use]
pub fn ascii_to_screen_code(ch: char) -> Option<u8> {
    let ch = ch.to_ascii_uppercase();
    match ch {
        '@' => Some(0x00),
        'A'..='Z' => Some(ch as u8 - b'A' + 1),
        '[' => Some(0x1B),
        '\\' => Some(0x1C),
        ']' => Some(0x1D),
        '^' => Some(0x1E),
        '_' => Some(0x1F),
        ' '..='?' => Some(ch as u8),
        _ => None,
    }
}

/// Locate the active screen from the VIC-II pointer (`$D018`) and the CIA2
/// bank select (`$DD00`).
#[must_use]
pub fn screen_base(d018: u8, dd00: u8) -> u16 {
    let bank = u16::from(3 - (dd00 & 0x03));
    let offset = u16::from((d018 >> 4) & 0x0F) * 0x0400;
    bank * 0x4000 + offset
}

/// Render raw screen RAM as one string per row, trailing blanks trimmed.
#[must_use]
pub fn render_lines(screen: &[u8]) -> Vec<String> {
    screen
        .chunks(SCREEN_COLS)
        .take(SCREEN_ROWS)
        .map(|row| {
            let line: String = row.iter().map(|&code| screen_code_to_ascii(code)).collect();
            line.trim_end().to_string()
        })
        .collect()
}

/// Render raw screen RAM as newline-joined text.
#[must_use]
pub fn render_text(screen: &[u8]) -> String {
    render_lines(screen).join("\n")
}

/// Find `needle` in screen RAM, returning `(row, column)` of its first
/// character. Matches may wrap across rows, as the screen itself does.
#[must_use]
pub fn find_text(screen: &[u8], needle: &str) -> Option<(usize, usize)> {
    let codes: Option<Vec<u8>> = needle.chars().map(ascii_to_screen_code).collect();
    let codes = codes?;
    if codes.is_empty() || codes.len() > screen.len() {
        return None;
    }

    screen
        .windows(codes.len())
        .position(|window| {
            window
                .iter()
                .zip(&codes)
                .all(|(&have, &want)| have & 0x7F == want)
        })
        .map(|index| (index / SCREEN_COLS, index % SCREEN_COLS))
}

/// Whether the screen shows the BASIC interpreter idle at its prompt.
#[must_use]
pub fn detect_ready(text: &str) -> (bool, &'static str) {
    for line in text.lines() {
        if line.contains("READY.") {
            return (true, "found READY.");
        }
        if line.contains("COMMODORE 64 BASIC") {
            return (true, "found COMMODORE 64 BASIC banner");
        }
        if line.contains("BASIC BYTES FREE") {
            return (true, "found BASIC BYTES FREE line");
        }
    }
    (false, "no READY prompt detected")
}
