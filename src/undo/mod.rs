//! Undo history: the snapshot ledger and the live-graph swap.
//!
//! Every push serializes the live graph into a [`MemFile`](crate::storage::MemFile)
//! diffed against the active element, so an edit that touches one
//! datablock costs roughly one block of new memory. Stepping rebuilds the
//! target snapshot in full and only then swaps it in.

mod ledger;
mod swap;

pub use ledger::{LedgerLimits, PushReport, StepDirection, UndoElem, UndoLedger, UndoStorage};
pub use swap::{swap_main, Binding, NoWindows, SwapReport, WindowHost};
