#![forbid(unsafe_code)]

use std::{
    fs,
    io::{self, BufWriter, Read, Write},
    path::Path,
    sync::Arc,
};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::types::{DocError, Result};

/// Replaces `path` atomically with the bytes produced by `fill`.
///
/// The content is written into a temporary file next to the target and
/// renamed over it only after `fill` succeeded and the data was synced, so a
/// failed write never leaves a partial file behind.
pub fn write_atomic<F>(path: &Path, fill: F) -> Result<u64>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let tmp = NamedTempFile::new_in(dir)?;
    let mut counted = CountingWriter::new(BufWriter::new(tmp));
    fill(&mut counted)?;
    counted.flush()?;
    let written = counted.count;
    let tmp = counted
        .inner
        .into_inner()
        .map_err(|err| DocError::from(err.into_error()))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| DocError::from(err.error))?;
    debug!(path = %path.display(), bytes = written, "io.write_atomic");
    Ok(written)
}

struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// `Read` adapter over an ordered sequence of shared byte chunks.
pub struct ChunkReader<'a> {
    chunks: Box<dyn Iterator<Item = &'a Arc<[u8]>> + 'a>,
    current: &'a [u8],
}

impl<'a> ChunkReader<'a> {
    /// Streams `chunks` in order.
    pub fn new<I>(chunks: I) -> Self
    where
        I: Iterator<Item = &'a Arc<[u8]>> + 'a,
    {
        Self {
            chunks: Box::new(chunks),
            current: &[],
        }
    }
}

impl<'a> Read for ChunkReader<'a> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        while self.current.is_empty() {
            match self.chunks.next() {
                Some(next) => self.current = next,
                None => return Ok(0),
            }
        }
        let n = dst.len().min(self.current.len());
        dst[..n].copy_from_slice(&self.current[..n]);
        self.current = &self.current[n..];
        Ok(n)
    }
}
