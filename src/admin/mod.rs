#![forbid(unsafe_code)]

//! Inspection and verification of saved documents.
//!
//! Both entry points take a path and produce serializable reports, so the
//! command line front end can print them as text or JSON.

mod error;
mod inspect;
mod verify;

/// Error types for administrative operations.
pub use error::{AdminError, Result};

/// Block listing of a document file.
pub use inspect::{inspect, BlockEntry, InspectReport, StructSummary};

/// Full read of a document with integrity findings.
pub use verify::{verify, VerifyFinding, VerifyReport, VerifySeverity};
