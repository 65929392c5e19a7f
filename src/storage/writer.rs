#![forbid(unsafe_code)]

use std::io::Write;
use std::path::Path;

use rustc_hash::FxHashSet;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::graph::{encode_id, Datablock, IdHandle, Main, NameRef};
use crate::primitives::io::write_atomic;
use crate::storage::catalog::{Catalog, FieldWriter};
use crate::storage::format::{BlockCode, BlockHeader, FileHeader, BLOCK_HEADER_LEN};
use crate::types::{Checksum, Crc32Fast, DocError, Result, SessionUid};

/// Destination of a serialized snapshot.
///
/// The writer hands over one header chunk and then one chunk per block, so
/// implementations that keep chunks apart see stable block boundaries.
pub trait Sink {
    /// Appends one chunk.
    fn append(&mut self, bytes: &[u8]) -> Result<()>;
}

impl Sink for Vec<u8> {
    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.try_reserve(bytes.len())
            .map_err(DocError::oom(bytes.len()))?;
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Sink writing straight into an [`io::Write`](std::io::Write).
pub struct FlatSink<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> FlatSink<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Bytes appended so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Sink for FlatSink<W> {
    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }
}

/// Counters describing one serialization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    /// ID blocks written.
    pub ids: usize,
    /// Sub-data blocks written.
    pub data_blocks: usize,
    /// Pointers to freed datablocks written as null.
    pub dangling: usize,
    /// Total bytes appended, end block included.
    pub bytes: u64,
    /// CRC-32 stored in the end block.
    pub checksum: u32,
}

/// Per-datablock encoding state handed to the struct encoders.
pub struct WriteCtx<'m> {
    main: &'m Main,
    catalog: &'m Catalog,
    owner: SessionUid,
    refs: SmallVec<[IdHandle; 8]>,
    pending: Vec<Vec<u8>>,
    dangling: usize,
}

impl<'m> WriteCtx<'m> {
    fn new(main: &'m Main, catalog: &'m Catalog, owner: SessionUid) -> Self {
        Self {
            main,
            catalog,
            owner,
            refs: SmallVec::new(),
            pending: Vec::new(),
            dangling: 0,
        }
    }

    /// Identity to store for a pointer to another datablock.
    ///
    /// Live targets are queued for writing after the current block; freed
    /// ones are stored as null.
    pub fn id_ptr(&mut self, target: Option<IdHandle>) -> SessionUid {
        let Some(handle) = target else {
            return SessionUid::NULL;
        };
        match self.main.get(handle) {
            Some(block) => {
                self.refs.push(handle);
                block.header.uid
            }
            None => {
                trace!(owner = %self.owner, "writer.pointer.dangling");
                self.dangling += 1;
                SessionUid::NULL
            }
        }
    }

    /// Writes a list of datablock pointers as an owned `Link` array.
    pub fn id_array(&mut self, slot: u8, targets: &[IdHandle]) -> Result<SessionUid> {
        let uids: SmallVec<[SessionUid; 8]> = targets
            .iter()
            .map(|handle| self.id_ptr(Some(*handle)))
            .filter(|uid| !uid.is_null())
            .collect();
        self.data_array(slot, crate::graph::LINK_STRUCT, &uids, |uid, w| {
            w.set_ptr("ptr", *uid)
        })
    }

    /// Queues an owned sub-data block holding `items`, one struct element
    /// each. Returns the block identity to store in the owner's pointer.
    pub fn data_array<T>(
        &mut self,
        slot: u8,
        struct_name: &str,
        items: &[T],
        fill: impl Fn(&T, &mut FieldWriter<'_>),
    ) -> Result<SessionUid> {
        if items.is_empty() {
            return Ok(SessionUid::NULL);
        }
        let Some(struct_index) = self.catalog.index_of(struct_name) else {
            debug!(r#struct = struct_name, "writer.data.no_layout");
            return Ok(SessionUid::NULL);
        };
        let def = self
            .catalog
            .get(struct_index)
            .ok_or(DocError::Invalid("catalog index out of range"))?;
        let size = def.size();
        if size == 0 {
            return Ok(SessionUid::NULL);
        }
        let total = size
            .checked_mul(items.len())
            .ok_or(DocError::Invalid("sub-data array too large"))?;
        let len = u32::try_from(total).map_err(|_| DocError::Invalid("block exceeds 4 GiB"))?;
        let count =
            u32::try_from(items.len()).map_err(|_| DocError::Invalid("too many array elements"))?;
        let uid = self.owner.sub_data(slot);
        let mut block = Vec::new();
        block
            .try_reserve_exact(BLOCK_HEADER_LEN + total)
            .map_err(DocError::oom(BLOCK_HEADER_LEN + total))?;
        BlockHeader {
            code: BlockCode::DATA,
            len,
            old: uid,
            struct_index,
            count,
        }
        .encode_into(&mut block);
        block.resize(BLOCK_HEADER_LEN + total, 0);
        for (item, elem) in items
            .iter()
            .zip(block[BLOCK_HEADER_LEN..].chunks_exact_mut(size))
        {
            fill(item, &mut FieldWriter::new(def, elem));
        }
        self.pending.push(block);
        Ok(uid)
    }

    /// Kind code and target name for a name-based reference. Unset or
    /// dangling references store code 0.
    pub fn name_ref(&self, r: &NameRef) -> (u16, String) {
        match r.target().and_then(|handle| self.main.get(handle)) {
            Some(block) if block.header.kind == r.kind() => {
                (r.kind().code_u16(), block.name().to_string())
            }
            _ => (0, String::new()),
        }
    }
}

struct BlockWriter<'s> {
    sink: &'s mut dyn Sink,
    crc: Crc32Fast,
    stats: WriteStats,
}

impl<'s> BlockWriter<'s> {
    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.crc.update(bytes);
        self.sink.append(bytes)?;
        self.stats.bytes += bytes.len() as u64;
        Ok(())
    }

    fn finish(mut self) -> Result<WriteStats> {
        let checksum = self.crc.finalize();
        let mut end = Vec::with_capacity(BLOCK_HEADER_LEN + 4);
        BlockHeader {
            code: BlockCode::END,
            len: 4,
            old: SessionUid::NULL,
            struct_index: 0,
            count: 0,
        }
        .encode_into(&mut end);
        end.extend_from_slice(&checksum.to_le_bytes());
        self.sink.append(&end)?;
        self.stats.bytes += end.len() as u64;
        self.stats.checksum = checksum;
        Ok(self.stats)
    }
}

fn encode_block(
    block: &Datablock,
    catalog: &Catalog,
    ctx: &mut WriteCtx<'_>,
    out: &mut Vec<u8>,
) -> Result<()> {
    let kind = block.header.kind;
    let struct_index = catalog
        .index_of(kind.struct_name())
        .ok_or(DocError::Invalid("catalog has no layout for ID kind"))?;
    let def = catalog
        .get(struct_index)
        .ok_or(DocError::Invalid("catalog index out of range"))?;
    let len = u32::try_from(def.size()).map_err(|_| DocError::Invalid("block exceeds 4 GiB"))?;
    out.clear();
    BlockHeader {
        code: BlockCode::for_id(kind.code()),
        len,
        old: block.header.uid,
        struct_index,
        count: 1,
    }
    .encode_into(out);
    out.resize(BLOCK_HEADER_LEN + def.size(), 0);
    let mut w = FieldWriter::new(def, &mut out[BLOCK_HEADER_LEN..]);
    encode_id(block, &mut w, ctx)
}

/// Serializes `main` into `sink` using the layouts of `catalog`.
///
/// Blocks are emitted depth first from each list in kind and name order:
/// an ID block, then its sub-data, then the datablocks it points at. Every
/// identity is written at most once.
pub fn write_main(main: &Main, catalog: &Catalog, sink: &mut dyn Sink) -> Result<WriteStats> {
    let mut out = BlockWriter {
        sink,
        crc: Crc32Fast::default(),
        stats: WriteStats::default(),
    };
    out.emit(&FileHeader::default().encode())?;

    let dna = catalog.encode()?;
    let mut scratch = Vec::with_capacity(BLOCK_HEADER_LEN + dna.len());
    BlockHeader {
        code: BlockCode::CATALOG,
        len: u32::try_from(dna.len()).map_err(|_| DocError::Invalid("catalog exceeds 4 GiB"))?,
        old: SessionUid::NULL,
        struct_index: 0,
        count: 1,
    }
    .encode_into(&mut scratch);
    scratch.extend_from_slice(&dna);
    out.emit(&scratch)?;

    let mut written: FxHashSet<SessionUid> = FxHashSet::default();
    let mut stack: Vec<IdHandle> = Vec::new();
    for root in main.handles() {
        stack.push(root);
        while let Some(handle) = stack.pop() {
            let Some(block) = main.get(handle) else {
                continue;
            };
            if !written.insert(block.header.uid) {
                continue;
            }
            let mut ctx = WriteCtx::new(main, catalog, block.header.uid);
            encode_block(block, catalog, &mut ctx, &mut scratch)?;
            out.emit(&scratch)?;
            out.stats.ids += 1;
            out.stats.dangling += ctx.dangling;
            for data in ctx.pending.drain(..) {
                out.emit(&data)?;
                out.stats.data_blocks += 1;
            }
            stack.extend(ctx.refs.iter().rev().copied());
        }
    }

    let stats = out.finish()?;
    debug!(
        ids = stats.ids,
        data_blocks = stats.data_blocks,
        bytes = stats.bytes,
        "writer.write_main"
    );
    Ok(stats)
}

/// Saves `main` to `path` atomically with the compiled layouts.
pub fn write_file(main: &Main, path: &Path) -> Result<WriteStats> {
    let mut stats = WriteStats::default();
    write_atomic(path, |w| {
        let mut sink = FlatSink::new(w);
        stats = write_main(main, Catalog::compiled(), &mut sink)?;
        Ok(())
    })?;
    Ok(stats)
}
