//! Byte ↔ placeholder-symbol bijection for byte-level BPE
//!
//! Every byte value 0–255 gets one printable `char`, so merges can operate on
//! plain strings without whitespace or control characters leaking into the
//! merge table. Bytes that are already printable Latin-1 keep their own code
//! point; the rest are shifted up to `U+0100` and beyond, in byte order.

use std::collections::HashMap;

use crate::{Error, Result};

/// Bijection between the 256 byte values and their placeholder symbols.
#[derive(Debug, Clone)]
pub struct ByteSymbolMap {
    byte_to_symbol: [char; 256],
    symbol_to_byte: HashMap<char, u8>,
}

impl Default for ByteSymbolMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSymbolMap {
    /// Build the standard byte-level mapping.
    #[must_use]
    pub fn new() -> Self {
        let mut byte_to_symbol = ['\0'; 256];
        let mut shifted = 0u32;
        for (byte, slot) in (0u8..=255).zip(byte_to_symbol.iter_mut()) {
            *slot = if is_printable(byte) {
                char::from(byte)
            } else {
                let symbol = char::from_u32(256 + shifted).unwrap_or(char::REPLACEMENT_CHARACTER);
                shifted += 1;
                symbol
            };
        }

        let symbol_to_byte = (0u8..=255)
            .map(|byte| (byte_to_symbol[usize::from(byte)], byte))
            .collect();

        Self {
            byte_to_symbol,
            symbol_to_byte,
        }
    }

    /// Placeholder symbol for `byte`.
    #[must_use]
    pub fn symbol(&self, byte: u8) -> char {
        self.byte_to_symbol[usize::from(byte)]
    }

    /// Byte value behind `symbol`, if it is a placeholder.
    #[must_use]
    pub fn byte(&self, symbol: char) -> Option<u8> {
        self.symbol_to_byte.get(&symbol).copied()
    }

    /// Map raw bytes to one placeholder symbol each.
    pub fn symbols<'a>(&'a self, bytes: &'a [u8]) -> impl Iterator<Item = char> + 'a {
        bytes.iter().map(|&b| self.symbol(b))
    }

    /// Invert the mapping for a whole symbol string, appending to `out`.
    ///
    /// # Errors
    /// Returns an error if `symbols` contains a character outside the mapping.
    pub fn decode_into(&self, symbols: &str, out: &mut Vec<u8>) -> Result<()> {
        for c in symbols.chars() {
            let byte = self.byte(c).ok_or_else(|| {
                Error::Tokenizer(format!("Character {c:?} is not a byte-level symbol"))
            })?;
            out.push(byte);
        }
        Ok(())
    }
}

/// Bytes that map to themselves: `!`..=`~`, `¡`..=`¬`, `®`..=`ÿ`.
fn is_printable(byte: u8) -> bool {
    matches!(byte, b'!'..=b'~' | 0xA1..=0xAC | 0xAE..=0xFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_bijection_covers_all_bytes() {
        let map = ByteSymbolMap::new();
        let symbols: HashSet<char> = (0u8..=255).map(|b| map.symbol(b)).collect();
        assert_eq!(symbols.len(), 256);
        for b in 0u8..=255 {
            assert_eq!(map.byte(map.symbol(b)), Some(b));
        }
    }

    #[test]
    fn test_printable_bytes_map_to_themselves() {
        let map = ByteSymbolMap::new();
        assert_eq!(map.symbol(b'a'), 'a');
        assert_eq!(map.symbol(b'!'), '!');
        assert_eq!(map.symbol(0xE9), 'é');
    }

    #[test]
    fn test_shifted_bytes() {
        let map = ByteSymbolMap::new();
        // Byte 0 is the first non-printable byte, space is number 32.
        assert_eq!(map.symbol(0), '\u{100}');
        assert_eq!(map.symbol(b' '), '\u{120}');
        assert_eq!(map.symbol(b'\n'), '\u{10A}');
    }

    #[test]
    fn test_decode_rejects_foreign_symbol() {
        let map = ByteSymbolMap::new();
        let mut out = Vec::new();
        assert!(map.decode_into("\u{4E2D}", &mut out).is_err());
    }
}
