#![forbid(unsafe_code)]

//! Shared error taxonomy, identity tokens and checksum helpers.

use std::collections::TryReserveError;
use std::fmt;
use std::io;

pub mod checksum;

pub use checksum::{Checksum, Crc32Fast};

/// Opaque identity of a serialized object.
///
/// Written into every block header as the source identity and used only to
/// deduplicate writes and relink pointers on read. Never dereferenced.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct SessionUid(pub u64);

impl SessionUid {
    /// The null identity, written for absent pointers.
    pub const NULL: SessionUid = SessionUid(0);
    /// Tag bit carried by identities of owned sub-data.
    pub const DATA_BIT: u64 = 1 << 63;

    /// Largest owner identity whose sub-data identities stay distinct.
    pub const MAX_OWNER: u64 = (1 << 55) - 1;

    /// Derives the identity of a sub-data array owned by `self`.
    pub fn sub_data(self, slot: u8) -> SessionUid {
        debug_assert!(self.0 <= Self::MAX_OWNER, "sub-data owner {self} out of range");
        SessionUid(Self::DATA_BIT | (self.0 << 8) | u64::from(slot))
    }

    /// Returns true for the null identity.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SessionUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Errors raised while persisting, restoring or navigating document history.
#[derive(thiserror::Error, Debug)]
pub enum DocError {
    /// Underlying I/O failure.
    #[error("IO: {0}")]
    Io(io::Error),
    /// The input does not start with a document header.
    #[error("not a valid document file: {0}")]
    NotAValidFile(&'static str),
    /// The input ended inside a header or block.
    #[error("truncated input: {0}")]
    Truncated(&'static str),
    /// The input was written by a newer format or contains unknown types.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),
    /// Structural inconsistency in the input.
    #[error("corruption: {0}")]
    Corrupt(&'static str),
    /// A fallible allocation failed.
    #[error("out of memory allocating {0} bytes")]
    OutOfMemory(usize),
    /// There is no older history element to step to.
    #[error("no undo step available")]
    NoUndoAvailable,
    /// There is no newer history element to step to.
    #[error("no redo step available")]
    NoRedoAvailable,
    /// Invalid caller-supplied argument.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// A requested item does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
}

impl From<io::Error> for DocError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DocError::Truncated("unexpected end of input")
        } else {
            DocError::Io(err)
        }
    }
}

impl DocError {
    pub(crate) fn oom(requested: usize) -> impl FnOnce(TryReserveError) -> DocError {
        move |_| DocError::OutOfMemory(requested)
    }

    /// Returns true for the navigation no-ops that leave all state unchanged.
    pub fn is_navigation_noop(&self) -> bool {
        matches!(self, DocError::NoUndoAvailable | DocError::NoRedoAvailable)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DocError>;
