#![forbid(unsafe_code)]

//! Running checksum over a snapshot stream.

/// Incremental 32-bit checksum.
pub trait Checksum {
    /// Starts over.
    fn reset(&mut self);
    /// Feeds `bytes`.
    fn update(&mut self, bytes: &[u8]);
    /// Checksum of everything fed since the last reset.
    fn finalize(&self) -> u32;
}

/// CRC-32 as stored in the end block, plus the number of bytes it covers.
#[derive(Clone)]
pub struct Crc32Fast {
    inner: crc32fast::Hasher,
    covered: u64,
}

impl Default for Crc32Fast {
    fn default() -> Self {
        Self {
            inner: crc32fast::Hasher::new(),
            covered: 0,
        }
    }
}

impl Crc32Fast {
    /// Bytes fed since the last reset, i.e. the stream offset reached.
    pub fn covered(&self) -> u64 {
        self.covered
    }
}

impl Checksum for Crc32Fast {
    fn reset(&mut self) {
        self.inner.reset();
        self.covered = 0;
    }

    fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
        self.covered += bytes.len() as u64;
    }

    fn finalize(&self) -> u32 {
        self.inner.clone().finalize()
    }
}
