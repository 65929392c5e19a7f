#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use crate::types::DocError;
use thiserror::Error;

/// Error type for inspection and verification.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Document file not found at the specified path.
    #[error("document not found: {0}")]
    MissingFile(PathBuf),
    /// Core document error.
    #[error(transparent)]
    Core(#[from] DocError),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for administrative operations.
pub type Result<T> = std::result::Result<T, AdminError>;

impl AdminError {
    pub(crate) fn missing_file(path: impl AsRef<Path>) -> Self {
        AdminError::MissingFile(path.as_ref().to_path_buf())
    }
}

pub(crate) fn ensure_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(AdminError::missing_file(path))
    }
}
