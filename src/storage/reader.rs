#![forbid(unsafe_code)]

//! Snapshot reconstruction.
//!
//! Reading runs in phases: every block is scanned, validated and translated
//! to the compiled layouts first; pointers are relinked once all identities
//! are known; name-based references are resolved last, against the fully
//! rebuilt lists. Nothing reaches the caller unless every phase succeeds.

use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::{debug, warn};

use crate::graph::{
    clamp_name, decode_id, Datablock, IdHandle, IdHeader, IdKind, Main, NameRef, RegistryId,
    LINK_STRUCT, MAX_NAME_LEN,
};
use crate::storage::catalog::{Catalog, FieldReader, StructMap};
use crate::storage::format::{BlockCode, BlockHeader, FileHeader, BLOCK_HEADER_LEN, FILE_HEADER_LEN};
use crate::types::{Checksum, Crc32Fast, DocError, Result, SessionUid};

const PAYLOAD_PREALLOC: usize = 1 << 20;

/// Progress of one read.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum ReadPhase {
    /// Framing, catalog and per-block validation.
    Scanning,
    /// Pointer relinking and datablock reconstruction.
    Linking,
    /// Resolution of name-based references.
    NameResolving,
    /// Finished successfully.
    Done,
    /// Aborted; nothing was returned.
    Failed,
}

/// Counters describing one read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReadReport {
    /// Format revision of the input.
    pub format_version: u16,
    /// Blocks after the catalog, end block excluded.
    pub blocks: usize,
    /// ID datablocks rebuilt.
    pub ids: usize,
    /// Sub-data blocks seen.
    pub data_blocks: usize,
    /// Sub-data blocks nothing pointed at.
    pub orphaned_data: usize,
    /// Blocks translated from a different stored layout.
    pub remapped_blocks: usize,
    /// Pointers whose target was missing or of the wrong kind.
    pub dangling_pointers: usize,
    /// Name references without a matching datablock.
    pub unresolved_refs: usize,
    /// CRC-32 stored in the end block.
    pub checksum: u32,
}

/// Rebuilt graph plus what the read observed.
#[derive(Debug)]
pub struct ReadOutcome {
    /// The reconstructed graph.
    pub main: Main,
    /// Read counters.
    pub report: ReadReport,
}

/// One framed block with its raw payload.
#[derive(Clone, Debug)]
pub struct RawBlock {
    /// Block header.
    pub header: BlockHeader,
    /// Payload bytes as stored.
    pub payload: Vec<u8>,
}

/// Iterates the framed blocks of a snapshot, checking the end block's CRC.
pub struct BlockStream<R: Read> {
    src: R,
    header: FileHeader,
    crc: Crc32Fast,
    checksum: Option<u32>,
}

fn read_full<R: Read>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

impl<R: Read> BlockStream<R> {
    /// Reads and validates the file header.
    pub fn open(mut src: R) -> Result<Self> {
        let mut buf = [0u8; FILE_HEADER_LEN];
        let n = read_full(&mut src, &mut buf)?;
        let header = FileHeader::decode(&buf[..n])?;
        let mut crc = Crc32Fast::default();
        crc.update(&buf);
        Ok(Self {
            src,
            header,
            crc,
            checksum: None,
        })
    }

    /// Decoded file header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Checksum from the end block, once it was reached.
    pub fn checksum(&self) -> Option<u32> {
        self.checksum
    }

    /// Stream offset of the next block.
    pub fn offset(&self) -> u64 {
        self.crc.covered()
    }

    /// Next block, or `None` after a valid end block.
    pub fn next_block(&mut self) -> Result<Option<RawBlock>> {
        if self.checksum.is_some() {
            return Ok(None);
        }
        let mut raw = [0u8; BLOCK_HEADER_LEN];
        match read_full(&mut self.src, &mut raw)? {
            0 => return Err(DocError::Truncated("missing end block")),
            BLOCK_HEADER_LEN => {}
            _ => return Err(DocError::Truncated("block header")),
        }
        let header = BlockHeader::decode(&raw);
        if header.code == BlockCode::END {
            if header.len != 4 {
                return Err(DocError::Corrupt("end block length"));
            }
            let mut stored = [0u8; 4];
            if read_full(&mut self.src, &mut stored)? != stored.len() {
                return Err(DocError::Truncated("end block"));
            }
            let stored = u32::from_le_bytes(stored);
            if stored != self.crc.finalize() {
                return Err(DocError::Corrupt("checksum mismatch"));
            }
            self.checksum = Some(stored);
            return Ok(None);
        }
        self.crc.update(&raw);
        let len = header.len as usize;
        let mut payload = Vec::new();
        payload
            .try_reserve(len.min(PAYLOAD_PREALLOC))
            .map_err(DocError::oom(len))?;
        (&mut self.src)
            .take(header.len as u64)
            .read_to_end(&mut payload)?;
        if payload.len() != len {
            return Err(DocError::Truncated("block payload"));
        }
        self.crc.update(&payload);
        Ok(Some(RawBlock { header, payload }))
    }
}

#[derive(Copy, Clone, Debug)]
enum Target {
    Id { handle: IdHandle, kind: IdKind },
    Data(usize),
}

#[derive(Debug)]
struct Record {
    kind: Option<IdKind>,
    compiled_index: u32,
    count: usize,
    bytes: Vec<u8>,
    old: SessionUid,
}

#[derive(Debug)]
struct PendingRef {
    owner: usize,
    ordinal: usize,
    kind: IdKind,
    name: String,
}

/// Pointer relinking state handed to the struct decoders.
pub struct LinkCtx<'a> {
    compiled: &'a Catalog,
    targets: &'a FxHashMap<SessionUid, Target>,
    records: &'a [Record],
    owner: usize,
    owner_refs: usize,
    pending: Vec<PendingRef>,
    referenced: FxHashSet<usize>,
    dangling: usize,
    unresolved: usize,
}

impl<'a> LinkCtx<'a> {
    fn begin(&mut self, owner: usize) {
        self.owner = owner;
        self.owner_refs = 0;
    }

    /// Handle for a stored pointer to a datablock of `kind`.
    ///
    /// Missing targets and targets of another kind relink to `None`.
    pub fn id_ptr(&mut self, raw: SessionUid, kind: IdKind) -> Option<IdHandle> {
        if raw.is_null() {
            return None;
        }
        match self.targets.get(&raw) {
            Some(Target::Id { handle, kind: found }) if *found == kind => Some(*handle),
            Some(_) => {
                warn!(ptr = %raw, expected = %kind, "reader.pointer.kind_mismatch");
                self.dangling += 1;
                None
            }
            None => {
                debug!(ptr = %raw, "reader.pointer.dangling");
                self.dangling += 1;
                None
            }
        }
    }

    /// Handles listed in a stored `Link` array, dangling entries dropped.
    pub fn id_array(&mut self, raw: SessionUid, kind: IdKind) -> Result<Vec<IdHandle>> {
        let mut raws = Vec::new();
        self.data_array(raw, LINK_STRUCT, |r| raws.push(r.ptr("ptr")))?;
        Ok(raws
            .into_iter()
            .filter_map(|ptr| self.id_ptr(ptr, kind))
            .collect())
    }

    /// Visits each element of the sub-data block behind `raw`. Returns the
    /// element count.
    pub fn data_array(
        &mut self,
        raw: SessionUid,
        struct_name: &str,
        mut visit: impl FnMut(FieldReader<'_>),
    ) -> Result<usize> {
        if raw.is_null() {
            return Ok(0);
        }
        let records = self.records;
        let index = match self.targets.get(&raw) {
            Some(Target::Data(index)) => *index,
            Some(Target::Id { .. }) => {
                warn!(ptr = %raw, "reader.data.points_at_id");
                self.dangling += 1;
                return Ok(0);
            }
            None => {
                debug!(ptr = %raw, "reader.data.dangling");
                self.dangling += 1;
                return Ok(0);
            }
        };
        let record = &records[index];
        let def = self
            .compiled
            .get(record.compiled_index)
            .ok_or(DocError::Corrupt("compiled struct index out of range"))?;
        if def.name() != struct_name {
            warn!(
                expected = struct_name,
                found = def.name(),
                "reader.data.struct_mismatch"
            );
            self.dangling += 1;
            return Ok(0);
        }
        if def.size() == 0 {
            return Ok(0);
        }
        self.referenced.insert(index);
        for elem in record.bytes.chunks_exact(def.size()) {
            visit(FieldReader::new(def, elem));
        }
        Ok(record.count)
    }

    /// Placeholder for a name-based reference, resolved after linking.
    pub fn name_ref(&mut self, stored: Option<(u16, String)>, kind: IdKind) -> NameRef {
        let ordinal = self.owner_refs;
        self.owner_refs += 1;
        if let Some((code, name)) = stored {
            if IdKind::from_code_u16(code) == Some(kind) {
                self.pending.push(PendingRef {
                    owner: self.owner,
                    ordinal,
                    kind,
                    name,
                });
            } else {
                warn!(code, name = name.as_str(), "reader.name_ref.kind_mismatch");
                self.unresolved += 1;
            }
        }
        NameRef::unset(kind)
    }
}

struct SnapshotReader<'c> {
    compiled: &'c Catalog,
    registry: RegistryId,
    phase: ReadPhase,
    report: ReadReport,
}

impl<'c> SnapshotReader<'c> {
    fn run<R: Read>(&mut self, src: R) -> Result<Main> {
        self.phase = ReadPhase::Scanning;
        let (records, targets) = self.scan(src)?;

        self.phase = ReadPhase::Linking;
        let mut ctx = LinkCtx {
            compiled: self.compiled,
            targets: &targets,
            records: &records,
            owner: 0,
            owner_refs: 0,
            pending: Vec::new(),
            referenced: FxHashSet::default(),
            dangling: 0,
            unresolved: 0,
        };
        let mut blocks = Vec::with_capacity(self.report.ids);
        for record in &records {
            let Some(kind) = record.kind else {
                continue;
            };
            let def = self
                .compiled
                .get(record.compiled_index)
                .ok_or(DocError::Corrupt("compiled struct index out of range"))?;
            let r = FieldReader::new(def, &record.bytes);
            let stored = r.chars("name");
            // lossy decoding of a full field can exceed the name limit
            let name = clamp_name(&stored, MAX_NAME_LEN).to_string();
            if name.is_empty() {
                return Err(DocError::Corrupt("ID block without a name"));
            }
            ctx.begin(blocks.len());
            let data = decode_id(kind, &r, &mut ctx)?;
            blocks.push(Datablock {
                header: IdHeader {
                    name,
                    kind,
                    use_count: r.int("us").clamp(0, i64::from(u32::MAX)) as u32,
                    uid: record.old,
                    registry: self.registry,
                },
                data,
            });
        }
        self.report.dangling_pointers = ctx.dangling;
        self.report.unresolved_refs = ctx.unresolved;
        self.report.orphaned_data = self.report.data_blocks - ctx.referenced.len();
        let pending = ctx.pending;

        self.phase = ReadPhase::NameResolving;
        let mut main = Main::from_loaded(self.registry, blocks)?;
        for p in pending {
            let Some(target) = main.lookup(p.kind, &p.name) else {
                warn!(kind = %p.kind, name = p.name.as_str(), "reader.name_ref.unresolved");
                self.report.unresolved_refs += 1;
                continue;
            };
            let owner = IdHandle::new(self.registry, p.owner as u32, 0);
            if let Some(block) = main.get_mut(owner) {
                if let Some(slot) = block.data.name_refs_mut().into_iter().nth(p.ordinal) {
                    slot.set(Some(target));
                }
            }
        }
        self.phase = ReadPhase::Done;
        Ok(main)
    }

    fn scan<R: Read>(
        &mut self,
        src: R,
    ) -> Result<(Vec<Record>, FxHashMap<SessionUid, Target>)> {
        let mut stream = BlockStream::open(src)?;
        self.report.format_version = stream.header().format_version;
        let first = stream
            .next_block()?
            .ok_or(DocError::Corrupt("missing catalog block"))?;
        if first.header.code != BlockCode::CATALOG {
            return Err(DocError::Corrupt("first block is not the catalog"));
        }
        let stored = Catalog::decode(&first.payload)?;

        let mut maps: FxHashMap<u32, (u32, StructMap)> = FxHashMap::default();
        let mut records = Vec::new();
        let mut targets = FxHashMap::default();
        while let Some(block) = stream.next_block()? {
            let header = block.header;
            self.report.blocks += 1;
            let kind = if header.code == BlockCode::DATA {
                None
            } else if header.code == BlockCode::CATALOG {
                return Err(DocError::Corrupt("second catalog block"));
            } else {
                let kind = header.code.id_code().and_then(IdKind::from_code);
                match kind {
                    Some(kind) => Some(kind),
                    None => {
                        return Err(DocError::UnsupportedVersion(format!(
                            "unknown block code {}",
                            header.code
                        )))
                    }
                }
            };
            let stored_def = stored
                .get(header.struct_index)
                .ok_or(DocError::Corrupt("struct index outside catalog"))?;
            if let Some(kind) = kind {
                if stored_def.name() != kind.struct_name() {
                    return Err(DocError::Corrupt("ID block struct does not match its code"));
                }
                if header.count != 1 {
                    return Err(DocError::Corrupt("ID block must hold one element"));
                }
            } else if header.count == 0 {
                return Err(DocError::Corrupt("empty data block"));
            }
            // The payload length bounds the element count only for sized structs.
            if stored_def.size() == 0 && header.count > 1 {
                return Err(DocError::Corrupt("zero-sized struct repeated in one block"));
            }
            if header.old.is_null() {
                return Err(DocError::Corrupt("block without identity"));
            }
            let (compiled_index, map) = match maps.entry(header.struct_index) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let compiled_index =
                        self.compiled.index_of(stored_def.name()).ok_or_else(|| {
                            DocError::UnsupportedVersion(format!(
                                "unknown struct {}",
                                stored_def.name()
                            ))
                        })?;
                    let compiled_def = self
                        .compiled
                        .get(compiled_index)
                        .ok_or(DocError::Corrupt("compiled struct index out of range"))?;
                    entry.insert((compiled_index, StructMap::new(stored_def, compiled_def)))
                }
            };
            let bytes = map.remap(&block.payload, header.count as usize)?;
            if !map.is_identity() {
                self.report.remapped_blocks += 1;
            }
            let target = match kind {
                Some(kind) => {
                    let handle = IdHandle::new(self.registry, self.report.ids as u32, 0);
                    self.report.ids += 1;
                    Target::Id { handle, kind }
                }
                None => {
                    self.report.data_blocks += 1;
                    Target::Data(records.len())
                }
            };
            if targets.insert(header.old, target).is_some() {
                return Err(DocError::Corrupt("duplicate block identity"));
            }
            records.push(Record {
                kind,
                compiled_index: *compiled_index,
                count: header.count as usize,
                bytes,
                old: header.old,
            });
        }
        self.report.checksum = stream.checksum().unwrap_or_default();
        Ok((records, targets))
    }
}

/// Rebuilds a graph from a snapshot stream, translating stored layouts to
/// `compiled`.
pub fn read_main<R: Read>(src: R, compiled: &Catalog) -> Result<ReadOutcome> {
    let mut reader = SnapshotReader {
        compiled,
        registry: RegistryId::next(),
        phase: ReadPhase::Scanning,
        report: ReadReport::default(),
    };
    match reader.run(src) {
        Ok(main) => {
            debug!(
                ids = reader.report.ids,
                data_blocks = reader.report.data_blocks,
                remapped = reader.report.remapped_blocks,
                "reader.read_main"
            );
            Ok(ReadOutcome {
                main,
                report: reader.report,
            })
        }
        Err(err) => {
            debug!(phase = ?reader.phase, error = %err, "reader.failed");
            reader.phase = ReadPhase::Failed;
            Err(err)
        }
    }
}

/// Opens and reads a snapshot file with the compiled layouts.
pub fn read_file(path: &Path) -> Result<ReadOutcome> {
    let file = File::open(path)?;
    read_main(BufReader::new(file), Catalog::compiled())
}
