//! Primitive field codecs
//!
//! Checked big-endian reads and the three string encodings used on the wire:
//! - fixed-width: exactly `N` bytes, value followed by null padding
//! - length-prefixed: 1-byte length (including terminator), value, null
//! - terminated: value and a null, bounded only by the remaining body

use bytes::{Buf, BufMut, BytesMut};

use super::{CodecError, CodecResult};

/// Longest value a 1-byte length prefix can carry (the prefix counts the terminator)
pub const MAX_PREFIXED_LEN: usize = u8::MAX as usize - 1;

/// Deepest table nesting accepted when decoding state fields and values
pub const MAX_NESTING_DEPTH: usize = 32;

/// An entity with a self-describing binary layout.
///
/// `encoded_len` must always equal the number of bytes `encode` emits and
/// `decode` consumes; list decoders rely on it to find sibling boundaries.
pub trait Wire: Sized {
    /// Number of bytes this value occupies on the wire
    fn encoded_len(&self) -> usize;

    /// Append the encoded value to `buf`
    fn encode<B: BufMut>(&self, buf: &mut B);

    /// Decode one value from the front of `buf`
    fn decode<B: Buf>(buf: &mut B) -> CodecResult<Self>;

    /// Encode into a fresh buffer
    fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf
    }

    /// Decode one value from the front of `bytes`, returning it together
    /// with the number of bytes consumed
    fn decode_prefix(bytes: &[u8]) -> CodecResult<(Self, usize)> {
        let mut cursor = bytes;
        let value = Self::decode(&mut cursor)?;
        Ok((value, bytes.len() - cursor.len()))
    }
}

/// Checked reads over any [`Buf`].
pub trait WireRead: Buf {
    fn ensure(&self, needed: usize, what: &'static str) -> CodecResult<()> {
        if self.remaining() < needed {
            return Err(CodecError::Truncated {
                what,
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    fn read_u8(&mut self, what: &'static str) -> CodecResult<u8> {
        self.ensure(1, what)?;
        Ok(self.get_u8())
    }

    fn read_u16(&mut self, what: &'static str) -> CodecResult<u16> {
        self.ensure(2, what)?;
        Ok(self.get_u16())
    }

    fn read_u32(&mut self, what: &'static str) -> CodecResult<u32> {
        self.ensure(4, what)?;
        Ok(self.get_u32())
    }

    fn read_u64(&mut self, what: &'static str) -> CodecResult<u64> {
        self.ensure(8, what)?;
        Ok(self.get_u64())
    }

    fn read_bool(&mut self, what: &'static str) -> CodecResult<bool> {
        Ok(self.read_u8(what)? != 0)
    }

    /// Read a `width`-byte null-padded string, trimming at the first null
    fn read_fixed_str(&mut self, width: usize, what: &'static str) -> CodecResult<String> {
        self.ensure(width, what)?;
        let mut raw = vec![0u8; width];
        self.copy_to_slice(&mut raw);
        Ok(trim_at_null(&raw))
    }

    /// Read a 1-byte length prefix followed by that many bytes, the last of
    /// which is the terminator
    fn read_prefixed_str(&mut self, what: &'static str) -> CodecResult<String> {
        let len = self.read_u8(what)? as usize;
        if len == 0 {
            return Err(CodecError::malformed(what, "length prefix must count the terminator"));
        }
        self.ensure(len, what)?;
        let mut raw = vec![0u8; len];
        self.copy_to_slice(&mut raw);
        Ok(trim_at_null(&raw[..len - 1]))
    }
}

impl<B: Buf> WireRead for B {}

/// String writes over any [`BufMut`].
pub trait WireWrite: BufMut {
    fn write_fixed_str(&mut self, value: &str, width: usize) {
        let value = truncate_utf8(value, width);
        self.put_slice(value.as_bytes());
        self.put_bytes(0, width - value.len());
    }

    fn write_prefixed_str(&mut self, value: &str) {
        let value = truncate_utf8(value, MAX_PREFIXED_LEN);
        self.put_u8((value.len() + 1) as u8);
        self.put_slice(value.as_bytes());
        self.put_u8(0);
    }

    fn write_terminated_str(&mut self, value: &str) {
        self.put_slice(value.as_bytes());
        self.put_u8(0);
    }

    /// Write a 16-bit element count. Callers must keep lists within `u16::MAX`.
    fn write_count(&mut self, count: usize) {
        debug_assert!(
            count <= u16::MAX as usize,
            "{} elements do not fit a 16-bit count",
            count
        );
        self.put_u16(count as u16);
    }
}

impl<B: BufMut> WireWrite for B {}

/// Encoded size of a length-prefixed string
pub fn prefixed_len(value: &str) -> usize {
    truncate_utf8(value, MAX_PREFIXED_LEN).len() + 2
}

/// Encoded size of a null-terminated string
pub fn terminated_len(value: &str) -> usize {
    value.len() + 1
}

/// Longest prefix of `value` that fits in `max` bytes without splitting a character
pub fn truncate_utf8(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn trim_at_null(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_str_pads_and_trims() {
        let mut buf = BytesMut::new();
        buf.write_fixed_str("rate", 16);
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[..5], b"rate\0");

        let mut cursor = &buf[..];
        assert_eq!(cursor.read_fixed_str(16, "name").unwrap(), "rate");
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_fixed_str_fills_whole_window() {
        let mut buf = BytesMut::new();
        buf.write_fixed_str("exactly16bytes!!", 16);
        buf.write_fixed_str("this one is far too long", 16);
        assert_eq!(buf.len(), 32);

        let mut cursor = &buf[..];
        assert_eq!(cursor.read_fixed_str(16, "name").unwrap(), "exactly16bytes!!");
        assert_eq!(cursor.read_fixed_str(16, "name").unwrap(), "this one is far ");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate_utf8("añb", 2), "a");
        assert_eq!(truncate_utf8("añb", 3), "añ");
        assert_eq!(truncate_utf8("abc", 10), "abc");
    }

    #[test]
    fn test_prefixed_str() {
        let mut buf = BytesMut::new();
        buf.write_prefixed_str("eth0");
        assert_eq!(&buf[..], b"\x05eth0\0");
        assert_eq!(prefixed_len("eth0"), buf.len());

        let mut cursor = &buf[..];
        assert_eq!(cursor.read_prefixed_str("port name").unwrap(), "eth0");
    }

    #[test]
    fn test_prefixed_str_caps_length() {
        let long = "x".repeat(400);
        let mut buf = BytesMut::new();
        buf.write_prefixed_str(&long);
        assert_eq!(buf[0], 255);
        assert_eq!(buf.len(), prefixed_len(&long));

        let mut cursor = &buf[..];
        assert_eq!(cursor.read_prefixed_str("desc").unwrap().len(), MAX_PREFIXED_LEN);
    }

    #[test]
    fn test_prefixed_str_overrun() {
        let mut cursor: &[u8] = b"\x09abc\0";
        let err = cursor.read_prefixed_str("desc").unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_zero_prefix_rejected() {
        let mut cursor: &[u8] = b"\x00";
        assert!(matches!(
            cursor.read_prefixed_str("desc"),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn test_terminated_str() {
        let mut buf = BytesMut::new();
        buf.write_terminated_str("hello world");
        buf.write_terminated_str("happy world");
        assert_eq!(buf.len(), terminated_len("hello world") * 2);

        assert_eq!(&buf[..12], b"hello world\0");
        assert_eq!(buf[buf.len() - 1], 0);
    }

    #[test]
    fn test_short_integer_reads() {
        let mut cursor: &[u8] = &[0x01, 0x02, 0x03];
        assert_eq!(
            cursor.read_u32("xid"),
            Err(CodecError::Truncated {
                what: "xid",
                needed: 4,
                remaining: 3,
            })
        );
        assert_eq!(cursor.read_u16("count").unwrap(), 0x0102);
    }

    #[test]
    fn test_write_count() {
        let mut buf = BytesMut::new();
        buf.write_count(0x0203);
        buf.write_count(u16::MAX as usize);
        assert_eq!(&buf[..], &[0x02, 0x03, 0xFF, 0xFF]);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "do not fit a 16-bit count")]
    fn test_write_count_overflow() {
        let mut buf = BytesMut::new();
        buf.write_count(u16::MAX as usize + 1);
    }
}
