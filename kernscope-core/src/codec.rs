//! Number parsing and formatting for values returned by the target.
//!
//! Debuggers answer expressions in either decimal or `0x` hex; addresses and
//! words are always treated as unsigned.

use thiserror::Error;

/// A value returned by the target could not be interpreted as a number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("empty numeric value")]
    Empty,
    #[error("invalid numeric value '{0}'")]
    InvalidDigit(String),
    #[error("value {0} does not fit a 32-bit target word")]
    OutOfRange(u64),
}

/// Fixed output widths used when rendering target values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexWidth {
    Byte,
    Word,
    Dword,
}

impl HexWidth {
    /// Number of hex digits produced for this width.
    pub const fn digits(self) -> usize {
        match self {
            Self::Byte => 2,
            Self::Word => 4,
            Self::Dword => 8,
        }
    }

    const fn mask(self) -> u64 {
        match self {
            Self::Byte => 0xFF,
            Self::Word => 0xFFFF,
            Self::Dword => 0xFFFF_FFFF,
        }
    }
}

/// Parse a decimal or `0x`-prefixed (case-insensitive) hex number.
pub fn parse_number(text: &str) -> Result<u64, FormatError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(FormatError::Empty);
    }

    let (digits, radix) = match text.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("0x") => (&text[2..], 16),
        _ => (text, 10),
    };
    // `from_str_radix` alone would accept a leading `+`.
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(FormatError::InvalidDigit(text.to_string()));
    }

    u64::from_str_radix(digits, radix).map_err(|_| FormatError::InvalidDigit(text.to_string()))
}

/// Parse a number and check it fits a 32-bit target word.
pub fn parse_word(text: &str) -> Result<u32, FormatError> {
    let value = parse_number(text)?;
    u32::try_from(value).map_err(|_| FormatError::OutOfRange(value))
}

/// Render `value` as exactly `width` uppercase hex digits, zero padded.
///
/// Bits above the width are dropped so the output length never varies.
pub fn format_hex(value: u64, width: HexWidth) -> String {
    format!("{:0w$X}", value & width.mask(), w = width.digits())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_and_hex() {
        assert_eq!(parse_number("536871168"), Ok(536_871_168));
        assert_eq!(parse_number("0x20000100"), Ok(0x2000_0100));
        assert_eq!(parse_number("0XdeadBEEF"), Ok(0xDEAD_BEEF));
        assert_eq!(parse_number(" 42\n"), Ok(42));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_number(""), Err(FormatError::Empty));
        assert!(matches!(parse_number("0x"), Err(FormatError::InvalidDigit(_))));
        assert!(matches!(parse_number("12ab"), Err(FormatError::InvalidDigit(_))));
        assert!(matches!(parse_number("-1"), Err(FormatError::InvalidDigit(_))));
        assert!(matches!(parse_number("0xZZ"), Err(FormatError::InvalidDigit(_))));
        assert_eq!(parse_number("+5"), Err(FormatError::InvalidDigit("+5".into())));
        assert_eq!(parse_number("0x+1F"), Err(FormatError::InvalidDigit("0x+1F".into())));
    }

    #[test]
    fn test_parse_word_range() {
        assert_eq!(parse_word("0xFFFFFFFF"), Ok(u32::MAX));
        assert_eq!(parse_word("4294967296"), Err(FormatError::OutOfRange(1 << 32)));
    }

    #[test]
    fn test_format_hex_widths() {
        assert_eq!(format_hex(0xA, HexWidth::Byte), "0A");
        assert_eq!(format_hex(0xBEEF, HexWidth::Word), "BEEF");
        assert_eq!(format_hex(0x100, HexWidth::Dword), "00000100");
        assert_eq!(format_hex(0x1_2345_6789, HexWidth::Dword), "23456789");
    }

    #[test]
    fn test_hex_round_trip() {
        for (value, width) in [
            (0u64, HexWidth::Byte),
            (0xFF, HexWidth::Byte),
            (0x1234, HexWidth::Word),
            (0x2000_0100, HexWidth::Dword),
            (u64::from(u32::MAX), HexWidth::Dword),
        ] {
            let text = format!("0x{}", format_hex(value, width));
            assert_eq!(text.len(), width.digits() + 2);
            assert_eq!(parse_number(&text), Ok(value));
        }
    }
}
