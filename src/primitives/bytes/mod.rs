#![forbid(unsafe_code)]
//! Encoding and buffer utilities shared across storage layers.

pub mod le {
    //! Little-endian encoders for the on-disk block format.

    use crate::types::{DocError, Result};

    /// Appends a u16 in little-endian order.
    pub fn put_u16(dst: &mut Vec<u8>, v: u16) {
        dst.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a u32 in little-endian order.
    pub fn put_u32(dst: &mut Vec<u8>, v: u32) {
        dst.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a u64 in little-endian order.
    pub fn put_u64(dst: &mut Vec<u8>, v: u64) {
        dst.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a u16 length-prefixed UTF-8 string.
    pub fn put_str(dst: &mut Vec<u8>, s: &str) -> Result<()> {
        let len: u16 = s
            .len()
            .try_into()
            .map_err(|_| DocError::Invalid("string longer than u16::MAX"))?;
        put_u16(dst, len);
        dst.extend_from_slice(s.as_bytes());
        Ok(())
    }

    /// Reads a u32 from the first four bytes of `src`.
    pub fn get_u32(src: &[u8]) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&src[..4]);
        u32::from_le_bytes(buf)
    }

    /// Reads a u64 from the first eight bytes of `src`.
    pub fn get_u64(src: &[u8]) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&src[..8]);
        u64::from_le_bytes(buf)
    }

    /// Writes `v` into `dst` using `dst.len()` bytes (1, 2, 4 or 8).
    pub fn write_uint(dst: &mut [u8], v: u64) {
        let bytes = v.to_le_bytes();
        let n = dst.len().min(8);
        dst[..n].copy_from_slice(&bytes[..n]);
    }

    /// Reads an unsigned value stored in `src.len()` bytes.
    pub fn read_uint(src: &[u8]) -> u64 {
        let mut buf = [0u8; 8];
        let n = src.len().min(8);
        buf[..n].copy_from_slice(&src[..n]);
        u64::from_le_bytes(buf)
    }

    /// Reads a two's complement value stored in `src.len()` bytes, sign extended.
    pub fn read_int(src: &[u8]) -> i64 {
        let n = src.len().min(8);
        if n == 0 {
            return 0;
        }
        let raw = read_uint(&src[..n]);
        let shift = 64 - (n as u32 * 8);
        ((raw << shift) as i64) >> shift
    }
}

pub mod buf {
    //! A slice-backed cursor that reports overruns as corruption.

    use core::fmt;

    use crate::types::{DocError, Result};

    /// A cursor for reading bytes from a slice with offset tracking.
    pub struct Cursor<'a> {
        buf: &'a [u8],
        off: usize,
    }

    impl<'a> Cursor<'a> {
        /// Creates a new cursor starting at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes from the cursor, advancing the offset.
        pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
            let end = self
                .off
                .checked_add(n)
                .ok_or(DocError::Corrupt("cursor offset overflow"))?;
            if end > self.buf.len() {
                return Err(DocError::Corrupt("unexpected end of payload"));
            }
            let slice = &self.buf[self.off..end];
            self.off = end;
            Ok(slice)
        }

        /// Reads one byte.
        pub fn u8(&mut self) -> Result<u8> {
            Ok(self.take(1)?[0])
        }

        /// Reads a little-endian u16.
        pub fn u16(&mut self) -> Result<u16> {
            let b = self.take(2)?;
            Ok(u16::from_le_bytes([b[0], b[1]]))
        }

        /// Reads a little-endian u32.
        pub fn u32(&mut self) -> Result<u32> {
            Ok(super::le::get_u32(self.take(4)?))
        }

        /// Reads a u16 length-prefixed UTF-8 string.
        pub fn str(&mut self) -> Result<&'a str> {
            let len = self.u16()? as usize;
            let bytes = self.take(len)?;
            core::str::from_utf8(bytes).map_err(|_| DocError::Corrupt("invalid UTF-8 string"))
        }

        /// Returns the number of bytes remaining in the buffer.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }

        /// Fails unless every byte was consumed.
        pub fn ensure_consumed(&self) -> Result<()> {
            if self.remaining() != 0 {
                return Err(DocError::Corrupt("unexpected trailing bytes in payload"));
            }
            Ok(())
        }
    }

    impl<'a> fmt::Debug for Cursor<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Cursor")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }
}

/// Copies `s` into a fixed NUL-padded field, truncating on a char boundary
/// so at least one terminating zero remains.
pub fn put_fixed_str(dst: &mut [u8], s: &str) {
    dst.fill(0);
    if dst.is_empty() {
        return;
    }
    let limit = dst.len() - 1;
    let cut = floor_char_boundary(s, limit);
    dst[..cut].copy_from_slice(&s.as_bytes()[..cut]);
}

/// Reads a NUL-padded fixed field, replacing invalid UTF-8.
pub fn get_fixed_str(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

/// Largest index `<= max` that lies on a char boundary of `s`.
pub fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut idx = max;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
