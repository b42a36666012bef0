//! Pluggable column-measurement hooks (spec §4.3, §6).
//!
//! The core engine never assumes UTF-8 or any other encoding; it asks
//! this small vtable for byte lengths and column widths instead, so a
//! host program can layer grapheme-aware or wide-character-aware
//! measurement on top without touching the display engine (spec §9
//! "Column measurement").

use crate::error::Result;

/// Byte length and on-screen column width of one "character" at a
/// given buffer position.
pub type CharLen = fn(buf: &[u8], pos: usize) -> (usize, usize);

/// Reads exactly one code point from a descriptor into `out`,
/// returning the number of bytes read. Used by the decoder when an
/// encoding-aware host wants multi-byte printable input assembled
/// before it reaches the buffer.
pub type ReadCode = fn(fd: i32, out: &mut [u8]) -> Result<usize>;

/// The printable-column length of a complete string (e.g. for sizing
/// a prompt).
pub type StrLen = fn(s: &[u8]) -> usize;

/// The set of encoding hooks a session uses. Defaults treat every byte
/// as one column, matching spec §6 "Defaults treat each byte as one
/// column".
#[derive(Clone, Copy)]
pub struct Encoding {
    pub prev_char_len: CharLen,
    pub next_char_len: CharLen,
    pub read_code: ReadCode,
    pub str_len: StrLen,
}

fn default_prev_char_len(buf: &[u8], pos: usize) -> (usize, usize) {
    if pos == 0 {
        (0, 0)
    } else {
        (1, 1)
    }
}

fn default_next_char_len(buf: &[u8], pos: usize) -> (usize, usize) {
    if pos >= buf.len() {
        (0, 0)
    } else {
        (1, 1)
    }
}

fn default_read_code(fd: i32, out: &mut [u8]) -> Result<usize> {
    crate::terminal::read_some(fd, &mut out[..1])
}

fn default_str_len(s: &[u8]) -> usize {
    s.len()
}

impl Default for Encoding {
    fn default() -> Encoding {
        Encoding {
            prev_char_len: default_prev_char_len,
            next_char_len: default_next_char_len,
            read_code: default_read_code,
            str_len: default_str_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_encoding_treats_each_byte_as_one_column() {
        let enc = Encoding::default();
        let buf = b"abc";
        assert_eq!((enc.next_char_len)(buf, 0), (1, 1));
        assert_eq!((enc.prev_char_len)(buf, 3), (1, 1));
    }

    #[test]
    fn default_encoding_is_empty_at_boundaries() {
        let enc = Encoding::default();
        let buf = b"abc";
        assert_eq!((enc.prev_char_len)(buf, 0), (0, 0));
        assert_eq!((enc.next_char_len)(buf, 3), (0, 0));
    }

    #[test]
    fn default_str_len_is_byte_length() {
        let enc = Encoding::default();
        assert_eq!((enc.str_len)(b"hello"), 5);
    }
}
