use byteorder::{ByteOrder, LittleEndian};

use crate::error::Result;
use crate::io::Buf;

/// The MySQL length-encoded integer, as a pure function.
///
/// Returns `(value, is_null, bytes_consumed)`. `0xFB` is the NULL marker.
/// A first byte announcing a width the buffer cannot satisfy yields exactly
/// `(0, true, 0)`: the caller sees NULL, nothing is consumed, and no error is
/// raised. Decoders treat the buffer as untrusted input; this function must
/// never read past `buf.len()`.
pub fn length_encoded_int(buf: &[u8]) -> (u64, bool, usize) {
    let Some(&first) = buf.first() else {
        return (0, true, 0);
    };

    match first {
        0xFB => (0, true, 1),

        0xFC if buf.len() >= 3 => (u64::from(LittleEndian::read_u16(&buf[1..])), false, 3),
        0xFD if buf.len() >= 4 => (u64::from(LittleEndian::read_u24(&buf[1..])), false, 4),
        0xFE if buf.len() >= 9 => (LittleEndian::read_u64(&buf[1..]), false, 9),

        0xFC | 0xFD | 0xFE | 0xFF => (0, true, 0),

        value => (u64::from(value), false, 1),
    }
}

pub trait BufExt<'a>: Buf<'a> {
    /// Advancing form of [`length_encoded_int`]; `None` covers both the NULL
    /// marker and a truncated width.
    fn get_uint_lenenc(&mut self) -> Result<Option<u64>>;

    fn get_bytes_lenenc(&mut self) -> Result<Option<&'a [u8]>>;

    fn get_str_lenenc(&mut self) -> Result<Option<&'a str>>;
}

impl<'a> BufExt<'a> for &'a [u8] {
    fn get_uint_lenenc(&mut self) -> Result<Option<u64>> {
        let (value, is_null, consumed) = length_encoded_int(self);
        self.advance(consumed)?;

        Ok(if is_null { None } else { Some(value) })
    }

    fn get_bytes_lenenc(&mut self) -> Result<Option<&'a [u8]>> {
        match self.get_uint_lenenc()? {
            Some(len) => self.get_bytes(len as usize).map(Some),
            None => Ok(None),
        }
    }

    fn get_str_lenenc(&mut self) -> Result<Option<&'a str>> {
        match self.get_uint_lenenc()? {
            Some(len) => self.get_str(len as usize).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{length_encoded_int, BufExt};

    #[test]
    fn it_decodes_one_byte_values() {
        assert_eq!(length_encoded_int(&[0x00]), (0, false, 1));
        assert_eq!(length_encoded_int(&[0xFA]), (0xFA, false, 1));
    }

    #[test]
    fn it_decodes_null() {
        assert_eq!(length_encoded_int(&[0xFB]), (0, true, 1));
        assert_eq!(length_encoded_int(&[0xFB, 0x01]), (0, true, 1));
    }

    #[test]
    fn it_decodes_wide_values() {
        assert_eq!(length_encoded_int(&[0xFC, 0x34, 0x12]), (0x1234, false, 3));
        assert_eq!(
            length_encoded_int(&[0xFD, 0x56, 0x34, 0x12]),
            (0x123456, false, 4)
        );
        assert_eq!(
            length_encoded_int(&[0xFE, 1, 0, 0, 0, 0, 0, 0, 0]),
            (1, false, 9)
        );
    }

    // every truncated width is (0, true, 0): seen as NULL, nothing consumed
    #[test]
    fn short_buffers_yield_null_without_consuming() {
        assert_eq!(length_encoded_int(&[]), (0, true, 0));
        assert_eq!(length_encoded_int(&[0xFC]), (0, true, 0));
        assert_eq!(length_encoded_int(&[0xFC, 0x01]), (0, true, 0));
        assert_eq!(length_encoded_int(&[0xFD, 0x01, 0x02]), (0, true, 0));
        assert_eq!(
            length_encoded_int(&[0xFE, 1, 2, 3, 4, 5, 6, 7]),
            (0, true, 0)
        );
        assert_eq!(length_encoded_int(&[0xFF]), (0, true, 0));
    }

    #[test]
    fn it_reads_lenenc_strings() {
        let mut buf: &[u8] = b"\x03def\x00";

        assert_eq!(buf.get_str_lenenc().unwrap(), Some("def"));
        assert_eq!(buf, b"\x00");
    }

    #[test]
    fn lenenc_string_with_lying_length_fails_cleanly() {
        let mut buf: &[u8] = b"\x09abc";

        assert!(buf.get_str_lenenc().is_err());
    }
}
