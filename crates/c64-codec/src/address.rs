//! Memory address notation.
//!
//! | Form          | Example        | Radix |
//! |---------------|----------------|-------|
//! | `$` prefix    | `$D020`        | 16    |
//! | `0x` prefix   | `0xd020`       | 16    |
//! | `%` prefix    | `%1101000000100000` | 2 |
//! | bare digits   | `53280`        | 10    |
//! | symbol        | `border`       | table |

use crate::ParseError;

/// Well-known locations accepted by name (case-insensitive).
pub const SYMBOLS: &[(&str, u16)] = &[
    ("zeropage", 0x0000),
    ("stack", 0x0100),
    ("screen", 0x0400),
    ("basic", 0x0801),
    ("basic_rom", 0xA000),
    ("vic", 0xD000),
    ("border", 0xD020),
    ("background", 0xD021),
    ("sid", 0xD400),
    ("color", 0xD800),
    ("colour", 0xD800),
    ("cia1", 0xDC00),
    ("cia2", 0xDD00),
    ("kernal", 0xE000),
];

/// Parse an address in any supported notation.
///
/// Unknown names, empty digit strings and values above `$FFFF` are
/// rejected; nothing is ever coerced to zero.
pub fn parse_address(text: &str) -> Result<u16, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::address(text, "empty input"));
    }

    let (digits, radix) = if let Some(rest) = trimmed.strip_prefix('$') {
        (rest, 16)
    } else if let Some(rest) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        (rest, 16)
    } else if let Some(rest) = trimmed.strip_prefix('%') {
        (rest, 2)
    } else if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        (trimmed, 10)
    } else {
        return lookup_symbol(trimmed)
            .ok_or_else(|| ParseError::address(text, "not a number or known symbol"));
    };

    if digits.is_empty() {
        return Err(ParseError::address(text, "no digits after radix marker"));
    }
    // from_str_radix accepts a leading sign; addresses never have one.
    if digits.starts_with('+') || digits.starts_with('-') {
        return Err(ParseError::address(text, "signs are not allowed"));
    }

    let value = u32::from_str_radix(digits, radix).map_err(|_| {
        ParseError::address(text, format!("invalid digits for radix {radix}"))
    })?;
    u16::try_from(value).map_err(|_| ParseError::address(text, "out of range (max $FFFF)"))
}

/// Render an address as `$XXXX`.
#[must_use]
pub fn format_address(address: u16) -> String {
    format!("${address:04X}")
}

fn lookup_symbol(name: &str) -> Option<u16> {
    SYMBOLS
        .iter()
        .find(|(symbol, _)| symbol.eq_ignore_ascii_case(name))
        .map(|&(_, address)| address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalent_notations_agree() {
        for text in ["$0400", "0x0400", "0X0400", "1024", "%10000000000", "screen", "SCREEN"] {
            assert_eq!(parse_address(text), Ok(1024), "{text}");
        }
    }

    #[test]
    fn hex_is_case_insensitive() {
        assert_eq!(parse_address("$d020"), Ok(0xD020));
        assert_eq!(parse_address("$D020"), Ok(0xD020));
        assert_eq!(parse_address("  $d020  "), Ok(0xD020));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = parse_address("GARBAGE").expect_err("garbage must not parse");
        assert!(err.to_string().contains("unable to parse"));
    }

    #[test]
    fn empty_digit_strings_are_rejected() {
        for text in ["", "   ", "$", "0x", "%"] {
            assert!(parse_address(text).is_err(), "{text:?}");
        }
    }

    #[test]
    fn bad_digits_for_radix_are_rejected() {
        assert!(parse_address("%102").is_err());
        assert!(parse_address("$G000").is_err());
        assert!(parse_address("12a").is_err());
        assert!(parse_address("$-1").is_err());
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert_eq!(parse_address("$FFFF"), Ok(0xFFFF));
        assert!(parse_address("$10000").is_err());
        assert!(parse_address("65536").is_err());
    }

    #[test]
    fn format_pads_to_four_digits() {
        assert_eq!(format_address(0x0400), "$0400");
        assert_eq!(format_address(0xD020), "$D020");
        assert_eq!(format_address(0), "$0000");
    }

    #[test]
    fn formatted_addresses_parse_back() {
        for address in [0u16, 1, 0x0400, 0x0801, 0xD020, 0xFFFF] {
            assert_eq!(parse_address(&format_address(address)), Ok(address));
        }
    }
}
