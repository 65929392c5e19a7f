#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::graph::Main;
use crate::storage::catalog::Catalog;
use crate::storage::memfile::{
    merge, verify_ownership, AppendStats, MemFile, MemFileBuilder, OwnershipReport,
};
use crate::storage::reader::{read_file, read_main, ReadOutcome};
use crate::storage::writer::{write_file, write_main};
use crate::types::{DocError, Result};
use crate::undo::swap::{swap_main, SwapReport, WindowHost};

/// Where snapshots are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UndoStorage {
    /// Chunked in-memory snapshots sharing unchanged chunks.
    Memory,
    /// One flat file per snapshot inside `dir`.
    Disk {
        /// Directory holding the snapshot files.
        dir: PathBuf,
    },
}

/// Retention limits of a ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerLimits {
    steps: usize,
    memory_limit: usize,
}

impl LedgerLimits {
    /// `steps` is clamped to at least one; a `memory_limit` of 0 is unlimited.
    pub fn new(steps: usize, memory_limit: usize) -> Self {
        Self {
            steps: steps.max(1),
            memory_limit,
        }
    }

    /// Maximum number of retained elements.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Maximum owned snapshot bytes, 0 for unlimited.
    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }
}

impl Default for LedgerLimits {
    fn default() -> Self {
        Self::new(32, 0)
    }
}

/// One named snapshot.
#[derive(Debug)]
pub struct UndoElem {
    name: String,
    memfile: MemFile,
    path: Option<PathBuf>,
    size: usize,
}

impl UndoElem {
    /// Name given at push time.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// In-memory snapshot; empty in disk mode.
    pub fn memfile(&self) -> &MemFile {
        &self.memfile
    }

    /// Snapshot file in disk mode.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Direction of a single history step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepDirection {
    /// Towards older snapshots.
    Undo,
    /// Towards newer snapshots.
    Redo,
}

/// What one push did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    /// Index of the new element.
    pub index: usize,
    /// Chunk sharing against the previous cursor element.
    pub append: AppendStats,
    /// Serialized bytes.
    pub bytes: u64,
    /// Redo elements discarded.
    pub discarded_redo: usize,
    /// Head elements evicted.
    pub evicted: usize,
}

/// Ordered, cursor-addressed history of snapshots.
#[derive(Debug)]
pub struct UndoLedger {
    elems: VecDeque<UndoElem>,
    cursor: Option<usize>,
    limits: LedgerLimits,
    storage: UndoStorage,
    disk_seq: u64,
}

impl UndoLedger {
    /// Empty ledger.
    pub fn new(limits: LedgerLimits, storage: UndoStorage) -> Self {
        Self {
            elems: VecDeque::new(),
            cursor: None,
            limits,
            storage,
            disk_seq: 0,
        }
    }

    /// Retention limits in effect.
    pub fn limits(&self) -> LedgerLimits {
        self.limits
    }

    /// Snapshot storage mode.
    pub fn storage(&self) -> &UndoStorage {
        &self.storage
    }

    /// Number of retained elements.
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// Returns true before the first push.
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Index of the active element.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// The active element.
    pub fn current(&self) -> Option<&UndoElem> {
        self.cursor.and_then(|i| self.elems.get(i))
    }

    /// Elements, oldest first.
    pub fn elems(&self) -> impl Iterator<Item = &UndoElem> {
        self.elems.iter()
    }

    /// Element names, oldest first.
    pub fn names(&self) -> Vec<&str> {
        self.elems.iter().map(UndoElem::name).collect()
    }

    /// Returns true when an older element exists.
    pub fn can_undo(&self) -> bool {
        matches!(self.cursor, Some(c) if c > 0)
    }

    /// Returns true when a newer element exists.
    pub fn can_redo(&self) -> bool {
        matches!(self.cursor, Some(c) if c + 1 < self.elems.len())
    }

    /// Snapshot bytes owned by the retained elements.
    pub fn memory_usage(&self) -> usize {
        self.elems.iter().map(|e| e.memfile.owned_bytes()).sum()
    }

    /// Replaces the limits and evicts down to them.
    pub fn set_limits(&mut self, limits: LedgerLimits) -> usize {
        self.limits = limits;
        self.evict()
    }

    fn snapshot_path(&mut self, dir: &Path) -> PathBuf {
        self.disk_seq += 1;
        dir.join(format!("undo-{}-{:06}.docg", std::process::id(), self.disk_seq))
    }

    /// Records the live graph as a new element after the cursor.
    ///
    /// Redo history past the cursor is discarded and the head is evicted to
    /// the configured limits. If serialization fails the ledger is unchanged.
    pub fn push(&mut self, name: &str, main: &Main) -> Result<PushReport> {
        let mut report = PushReport::default();
        let elem = match self.storage.clone() {
            UndoStorage::Memory => {
                let prev = self.current().map(|e| &e.memfile);
                let mut builder = MemFileBuilder::new(prev);
                let stats = write_main(main, Catalog::compiled(), &mut builder)?;
                let (memfile, append) = builder.finish();
                report.append = append;
                report.bytes = stats.bytes;
                UndoElem {
                    name: name.to_string(),
                    size: memfile.size(),
                    memfile,
                    path: None,
                }
            }
            UndoStorage::Disk { dir } => {
                let path = self.snapshot_path(&dir);
                let stats = write_file(main, &path)?;
                report.bytes = stats.bytes;
                UndoElem {
                    name: name.to_string(),
                    memfile: MemFile::new(),
                    path: Some(path),
                    size: stats.bytes as usize,
                }
            }
        };

        let keep = self.cursor.map_or(0, |c| c + 1);
        let tail: Vec<UndoElem> = self.elems.drain(keep..).collect();
        report.discarded_redo = tail.len();
        for stale in tail {
            discard(stale);
        }

        self.elems.push_back(elem);
        self.cursor = Some(self.elems.len() - 1);
        report.evicted = self.evict();
        report.index = self.elems.len() - 1;
        debug!(
            name,
            index = report.index,
            identical = report.append.identical_chunks,
            copied_bytes = report.append.copied_bytes,
            evicted = report.evicted,
            "undo.push"
        );
        Ok(report)
    }

    fn over_memory(&self) -> bool {
        self.limits.memory_limit > 0 && self.memory_usage() > self.limits.memory_limit
    }

    fn evict(&mut self) -> usize {
        let mut evicted = 0;
        while self.elems.len() > 1
            && self.cursor != Some(0)
            && (self.elems.len() > self.limits.steps || self.over_memory())
        {
            let Some(head) = self.elems.pop_front() else {
                break;
            };
            let UndoElem {
                name,
                memfile,
                path,
                ..
            } = head;
            let stats = match self.elems.front_mut() {
                Some(next) => merge(&mut next.memfile, memfile),
                None => memfile.release(),
            };
            if let Some(path) = path {
                remove_snapshot(&path);
            }
            self.cursor = self.cursor.map(|c| c - 1);
            evicted += 1;
            debug!(
                name = name.as_str(),
                freed_bytes = stats.freed_bytes,
                transferred = stats.transferred_chunks,
                "undo.evict"
            );
        }
        evicted
    }

    /// Reconstructs the graph stored in element `index`.
    pub fn read_elem(&self, index: usize) -> Result<ReadOutcome> {
        let elem = self
            .elems
            .get(index)
            .ok_or(DocError::NotFound("undo step"))?;
        match &elem.path {
            Some(path) => read_file(path),
            None => read_main(elem.memfile.reader(), Catalog::compiled()),
        }
    }

    fn activate(
        &mut self,
        target: usize,
        main: &mut Main,
        host: &mut dyn WindowHost,
    ) -> Result<SwapReport> {
        let outcome = self.read_elem(target)?;
        let report = swap_main(main, outcome.main, host);
        self.cursor = Some(target);
        info!(
            index = target,
            name = self.elems[target].name.as_str(),
            "undo.activate"
        );
        Ok(report)
    }

    /// Moves one element back or forth, replacing `main`.
    ///
    /// Navigation past either end reports `NoUndoAvailable` or
    /// `NoRedoAvailable` and changes nothing.
    pub fn step(
        &mut self,
        direction: StepDirection,
        main: &mut Main,
        host: &mut dyn WindowHost,
    ) -> Result<SwapReport> {
        let target = match (direction, self.cursor) {
            (StepDirection::Undo, Some(c)) if c > 0 => c - 1,
            (StepDirection::Undo, _) => return Err(DocError::NoUndoAvailable),
            (StepDirection::Redo, Some(c)) if c + 1 < self.elems.len() => c + 1,
            (StepDirection::Redo, _) => return Err(DocError::NoRedoAvailable),
        };
        self.activate(target, main, host)
    }

    /// Activates the element at `index` from the head.
    pub fn jump(
        &mut self,
        index: usize,
        main: &mut Main,
        host: &mut dyn WindowHost,
    ) -> Result<SwapReport> {
        if index >= self.elems.len() {
            return Err(DocError::NotFound("undo step"));
        }
        self.activate(index, main, host)
    }

    /// Activates the newest element named `name`.
    pub fn jump_to_name(
        &mut self,
        name: &str,
        main: &mut Main,
        host: &mut dyn WindowHost,
    ) -> Result<SwapReport> {
        let index = self
            .elems
            .iter()
            .rposition(|e| e.name == name)
            .ok_or(DocError::NotFound("undo step"))?;
        self.activate(index, main, host)
    }

    /// Audits chunk ownership across the retained elements.
    pub fn verify(&self) -> Result<OwnershipReport> {
        verify_ownership(self.elems.iter().map(|e| &e.memfile))
    }

    /// Drops every element, oldest first.
    pub fn clear(&mut self) {
        while let Some(elem) = self.elems.pop_front() {
            discard(elem);
        }
        self.cursor = None;
    }
}

impl Drop for UndoLedger {
    fn drop(&mut self) {
        self.clear();
    }
}

fn discard(elem: UndoElem) {
    if let Some(path) = &elem.path {
        remove_snapshot(path);
    }
    elem.memfile.release();
}

fn remove_snapshot(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "undo.snapshot.remove_failed");
    }
}
