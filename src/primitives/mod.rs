//! Low-level primitives shared by the storage layer.
//!
//! Includes byte encoders with a bounds-checked cursor, and the file
//! helpers used for flat saves and streamed snapshot reads.

/// Byte-level utilities and encoding/decoding.
///
/// Little-endian helpers for fixed-width integers and length-prefixed strings.
pub mod bytes;

/// I/O abstractions and utilities.
///
/// Atomic file replacement and a `Read` adapter over chunk sequences.
pub mod io;
