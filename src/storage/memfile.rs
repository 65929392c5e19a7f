#![forbid(unsafe_code)]

//! Chunked in-memory snapshots.
//!
//! A [`MemFile`] is the serialized byte stream of one snapshot split into the
//! chunks the writer appended. A chunk that is byte-identical to the chunk at
//! the matching position of the previous snapshot aliases that chunk's
//! payload instead of copying it. Exactly one `MemFile` in a history chain
//! owns each payload: the oldest one containing it.

use std::io::Write;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::trace;

use crate::primitives::io::ChunkReader;
use crate::storage::writer::Sink;
use crate::types::{DocError, Result};

/// One appended chunk.
#[derive(Clone, Debug)]
pub struct MemChunk {
    payload: Arc<[u8]>,
    is_identical: bool,
}

impl MemChunk {
    /// Chunk bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Chunk length.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns true for an empty chunk.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// True when the payload is borrowed from an older snapshot.
    pub fn is_identical(&self) -> bool {
        self.is_identical
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.payload) as *const u8 as usize
    }
}

/// Serialized snapshot held as a chunk list.
#[derive(Debug, Default)]
pub struct MemFile {
    chunks: Vec<MemChunk>,
    size: usize,
}

/// What one diffing write shared and copied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AppendStats {
    /// Chunks aliasing the previous snapshot.
    pub identical_chunks: usize,
    /// Chunks copied into new payloads.
    pub copied_chunks: usize,
    /// Bytes copied into new payloads.
    pub copied_bytes: usize,
    /// Bytes aliased from the previous snapshot.
    pub shared_bytes: usize,
}

/// What releasing a `MemFile` gave back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseStats {
    /// Owned payloads dropped.
    pub freed_chunks: usize,
    /// Bytes of owned payloads dropped.
    pub freed_bytes: usize,
    /// Payloads whose ownership moved to the successor first.
    pub transferred_chunks: usize,
}

impl MemFile {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks in stream order.
    pub fn chunks(&self) -> &[MemChunk] {
        &self.chunks
    }

    /// Total stream length in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns true if nothing was appended.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Bytes of payloads this snapshot owns.
    pub fn owned_bytes(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| !c.is_identical)
            .map(MemChunk::len)
            .sum()
    }

    /// Number of payloads this snapshot owns.
    pub fn owned_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| !c.is_identical).count()
    }

    /// Streams the snapshot bytes.
    pub fn reader(&self) -> ChunkReader<'_> {
        ChunkReader::new(self.chunks.iter().map(|c| &c.payload))
    }

    /// Shared handles to every payload, in order.
    pub fn payloads(&self) -> Vec<Arc<[u8]>> {
        self.chunks.iter().map(|c| Arc::clone(&c.payload)).collect()
    }

    /// Writes the snapshot as one flat stream.
    pub fn write_to(&self, out: &mut dyn Write) -> Result<u64> {
        for chunk in &self.chunks {
            out.write_all(&chunk.payload)?;
        }
        Ok(self.size as u64)
    }

    /// Drops the snapshot, reporting the payloads it owned.
    pub fn release(self) -> ReleaseStats {
        let mut stats = ReleaseStats::default();
        for chunk in &self.chunks {
            if !chunk.is_identical {
                stats.freed_chunks += 1;
                stats.freed_bytes += chunk.len();
            }
        }
        stats
    }
}

/// [`Sink`] producing a `MemFile` diffed against a previous snapshot.
///
/// Each appended chunk is compared with the previous snapshot at a cursor.
/// A match aliases the old payload and advances the cursor past it; a
/// mismatch copies the bytes and leaves the cursor in place. The chunk one
/// past the cursor is also tried so a single changed block does not stop
/// sharing for the rest of the stream.
pub struct MemFileBuilder<'p> {
    prev: Option<&'p MemFile>,
    cursor: usize,
    file: MemFile,
    stats: AppendStats,
}

impl<'p> MemFileBuilder<'p> {
    /// Starts a snapshot diffed against `prev`, if any.
    pub fn new(prev: Option<&'p MemFile>) -> Self {
        Self {
            prev,
            cursor: 0,
            file: MemFile::default(),
            stats: AppendStats::default(),
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> AppendStats {
        self.stats
    }

    /// Finishes the snapshot.
    pub fn finish(self) -> (MemFile, AppendStats) {
        (self.file, self.stats)
    }

    fn shared_at(&self, pos: usize, bytes: &[u8]) -> Option<Arc<[u8]>> {
        let chunk = self.prev?.chunks.get(pos)?;
        (chunk.payload.len() == bytes.len() && *chunk.payload == *bytes)
            .then(|| Arc::clone(&chunk.payload))
    }
}

impl Sink for MemFileBuilder<'_> {
    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.file
            .chunks
            .try_reserve(1)
            .map_err(DocError::oom(std::mem::size_of::<MemChunk>()))?;
        let shared = match self.shared_at(self.cursor, bytes) {
            Some(payload) => {
                self.cursor += 1;
                Some(payload)
            }
            None => self.shared_at(self.cursor + 1, bytes).map(|payload| {
                self.cursor += 2;
                payload
            }),
        };
        let chunk = match shared {
            Some(payload) => {
                self.stats.identical_chunks += 1;
                self.stats.shared_bytes += bytes.len();
                MemChunk {
                    payload,
                    is_identical: true,
                }
            }
            None => {
                let mut copy = Vec::new();
                copy.try_reserve_exact(bytes.len())
                    .map_err(DocError::oom(bytes.len()))?;
                copy.extend_from_slice(bytes);
                self.stats.copied_chunks += 1;
                self.stats.copied_bytes += bytes.len();
                MemChunk {
                    payload: Arc::from(copy),
                    is_identical: false,
                }
            }
        };
        self.file.size += bytes.len();
        self.file.chunks.push(chunk);
        Ok(())
    }
}

/// Moves ownership of every payload `from` owns and `into` aliases over to
/// `into`, then releases `from`.
///
/// Used when the oldest history element is evicted: its successor keeps the
/// shared payloads alive and becomes their owner.
pub fn merge(into: &mut MemFile, mut from: MemFile) -> ReleaseStats {
    let mut owned: FxHashMap<usize, usize> = from
        .chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_identical)
        .map(|(i, c)| (c.key(), i))
        .collect();
    let mut transferred = 0;
    for chunk in into.chunks.iter_mut().filter(|c| c.is_identical) {
        if let Some(idx) = owned.remove(&chunk.key()) {
            chunk.is_identical = false;
            from.chunks[idx].is_identical = true;
            transferred += 1;
        }
    }
    let mut stats = from.release();
    stats.transferred_chunks = transferred;
    trace!(
        transferred,
        freed = stats.freed_chunks,
        freed_bytes = stats.freed_bytes,
        "memfile.merge"
    );
    stats
}

/// Distinct payloads across a verified chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OwnershipReport {
    /// Distinct payloads.
    pub payloads: usize,
    /// Bytes held by distinct payloads.
    pub bytes: usize,
}

/// Checks that every payload in `chain` (oldest first) has exactly one
/// owner and that the owner is the oldest snapshot containing it.
pub fn verify_ownership<'a, I>(chain: I) -> Result<OwnershipReport>
where
    I: IntoIterator<Item = &'a MemFile>,
{
    struct Seen {
        first: usize,
        owner: Option<usize>,
        owners: usize,
        len: usize,
    }
    let mut seen: FxHashMap<usize, Seen> = FxHashMap::default();
    for (pos, file) in chain.into_iter().enumerate() {
        for chunk in &file.chunks {
            let entry = seen.entry(chunk.key()).or_insert(Seen {
                first: pos,
                owner: None,
                owners: 0,
                len: chunk.len(),
            });
            if !chunk.is_identical {
                entry.owners += 1;
                entry.owner = Some(pos);
            }
        }
    }
    let mut report = OwnershipReport::default();
    for entry in seen.values() {
        if entry.owners != 1 {
            return Err(DocError::Corrupt("chunk payload without exactly one owner"));
        }
        if entry.owner != Some(entry.first) {
            return Err(DocError::Corrupt("chunk payload owned by a newer snapshot"));
        }
        report.payloads += 1;
        report.bytes += entry.len;
    }
    Ok(report)
}
