#![forbid(unsafe_code)]

//! File header and block framing.
//!
//! ```text
//! file   := header(16) block* endb
//! header := "DOCGRAPH" version:u16 ptr_size:u8 'L' reserved[4]
//! block  := code[4] len:u32 old:u64 struct_index:u32 count:u32 payload[len]
//! endb   := "ENDB" 4 0 0 0 crc32:u32
//! ```
//! All integers are little endian.

use std::fmt;

use crate::primitives::bytes::le;
use crate::types::{DocError, Result, SessionUid};

pub const FILE_MAGIC: [u8; 8] = *b"DOCGRAPH";
pub const FILE_FORMAT_VERSION: u16 = 1;
pub const FILE_HEADER_LEN: usize = 16;
pub const BLOCK_HEADER_LEN: usize = 24;
const POINTER_SIZE: u8 = 8;
const ENDIAN_LITTLE: u8 = b'L';

pub mod header {
    //! Byte offsets for fixed file header fields.
    use core::ops::Range;

    pub const MAGIC: Range<usize> = 0..8;
    pub const FORMAT_VERSION: Range<usize> = 8..10;
    pub const POINTER_SIZE: usize = 10;
    pub const ENDIAN: usize = 11;
    pub const RESERVED: Range<usize> = 12..16;
}

/// Four byte tag identifying what a block carries.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlockCode(pub [u8; 4]);

impl BlockCode {
    /// Embedded structural type catalog.
    pub const CATALOG: BlockCode = BlockCode(*b"DNA1");
    /// Owned sub-data referenced by an ID.
    pub const DATA: BlockCode = BlockCode(*b"DATA");
    /// Stream terminator carrying the checksum.
    pub const END: BlockCode = BlockCode(*b"ENDB");

    /// Block code of an ID with the two-character kind `code`.
    pub const fn for_id(code: [u8; 2]) -> BlockCode {
        BlockCode([code[0], code[1], 0, 0])
    }

    /// Returns the two-character ID code when this is an ID block code.
    pub fn id_code(self) -> Option<[u8; 2]> {
        (self.0[2] == 0 && self.0[3] == 0 && self.0[0] != 0).then_some([self.0[0], self.0[1]])
    }
}

impl fmt::Debug for BlockCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for BlockCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b == 0 {
                continue;
            }
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{}", hex::encode([b]))?;
            }
        }
        Ok(())
    }
}

/// Decoded file header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileHeader {
    /// Format revision the file was written with.
    pub format_version: u16,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            format_version: FILE_FORMAT_VERSION,
        }
    }
}

impl FileHeader {
    pub fn encode(&self) -> [u8; FILE_HEADER_LEN] {
        let mut buf = [0u8; FILE_HEADER_LEN];
        buf[header::MAGIC].copy_from_slice(&FILE_MAGIC);
        buf[header::FORMAT_VERSION].copy_from_slice(&self.format_version.to_le_bytes());
        buf[header::POINTER_SIZE] = POINTER_SIZE;
        buf[header::ENDIAN] = ENDIAN_LITTLE;
        buf[header::RESERVED].fill(0);
        buf
    }

    /// Validates a header. `src` may be shorter than a full header when the
    /// input ended early.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < FILE_MAGIC.len() || src[header::MAGIC] != FILE_MAGIC {
            return Err(DocError::NotAValidFile("missing DOCGRAPH magic"));
        }
        if src.len() < FILE_HEADER_LEN {
            return Err(DocError::Truncated("file header"));
        }
        let format_version = u16::from_le_bytes([src[8], src[9]]);
        if format_version > FILE_FORMAT_VERSION {
            return Err(DocError::UnsupportedVersion(format!(
                "file format {format_version} is newer than {FILE_FORMAT_VERSION}"
            )));
        }
        if src[header::POINTER_SIZE] != POINTER_SIZE || src[header::ENDIAN] != ENDIAN_LITTLE {
            return Err(DocError::UnsupportedVersion(format!(
                "pointer size {} / endianness {:?} not supported",
                src[header::POINTER_SIZE],
                src[header::ENDIAN] as char
            )));
        }
        if src[header::RESERVED].iter().any(|&b| b != 0) {
            return Err(DocError::Corrupt("file header reserved bytes not zero"));
        }
        Ok(Self { format_version })
    }
}

/// Header preceding every block payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockHeader {
    /// What the block carries.
    pub code: BlockCode,
    /// Payload length in bytes.
    pub len: u32,
    /// Identity of the source object.
    pub old: SessionUid,
    /// Index into the embedded catalog.
    pub struct_index: u32,
    /// Number of struct elements in the payload.
    pub count: u32,
}

impl BlockHeader {
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.code.0);
        le::put_u32(out, self.len);
        le::put_u64(out, self.old.0);
        le::put_u32(out, self.struct_index);
        le::put_u32(out, self.count);
    }

    pub fn decode(src: &[u8; BLOCK_HEADER_LEN]) -> Self {
        let mut code = [0u8; 4];
        code.copy_from_slice(&src[0..4]);
        Self {
            code: BlockCode(code),
            len: le::get_u32(&src[4..8]),
            old: SessionUid(le::get_u64(&src[8..16])),
            struct_index: le::get_u32(&src[16..20]),
            count: le::get_u32(&src[20..24]),
        }
    }
}
