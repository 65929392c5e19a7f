//! Snapshot storage: the self-describing file format and its chunk store.
//!
//! A snapshot is a header followed by typed blocks. The first block embeds
//! the struct catalog the snapshot was written with, so a reader built from
//! a different layout revision can still translate every record.

/// Struct layouts, field access by name and layout reconciliation.
pub mod catalog;

/// File header, block framing and block codes.
pub mod format;

/// Chunked in-memory snapshots that share unchanged chunks.
pub mod memfile;

/// Snapshot reconstruction.
pub mod reader;

/// Graph serialization into a byte sink.
pub mod writer;

pub use catalog::Catalog;
pub use memfile::{
    merge, verify_ownership, AppendStats, MemChunk, MemFile, MemFileBuilder, OwnershipReport,
    ReleaseStats,
};
pub use reader::{read_file, read_main, ReadOutcome, ReadPhase, ReadReport};
pub use writer::{write_file, write_main, FlatSink, Sink, WriteStats};
