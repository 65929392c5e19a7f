//! Document graph persistence with chunk-sharing undo history.
//!
//! A [`graph::Main`] holds typed datablocks that point at each other. It is
//! written as a self-describing block stream ([`storage`]) either to a file
//! or into a [`storage::MemFile`] that shares unchanged chunks with the
//! previous snapshot, which is what the [`undo`] ledger stores. A
//! [`session::Session`] ties the live graph, its history, the window layer
//! and autosave together.

#![warn(missing_docs)]

pub mod admin;
pub mod graph;
pub mod primitives;
pub mod session;
pub mod storage;
pub mod types;
pub mod undo;
pub mod wm;

pub use graph::{IdHandle, IdKind, Main};
pub use session::{Session, SessionConfig};
pub use types::{DocError, Result};
pub use undo::{UndoLedger, WindowHost};
