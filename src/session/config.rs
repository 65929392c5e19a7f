#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::undo::{LedgerLimits, UndoStorage};

/// How undo snapshots are stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Chunked in-memory snapshots.
    #[default]
    Memory,
    /// One flat file per snapshot.
    Disk,
}

/// `[undo]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    /// Retained history elements.
    pub steps: usize,
    /// Snapshot memory budget in MiB, 0 for unlimited.
    pub memory_limit_mb: usize,
    /// Snapshot storage mode.
    pub storage: StorageKind,
    /// Directory for disk snapshots; defaults to a temp directory.
    pub disk_dir: Option<PathBuf>,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            steps: 32,
            memory_limit_mb: 0,
            storage: StorageKind::Memory,
            disk_dir: None,
        }
    }
}

/// `[autosave]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Whether the periodic autosave runs.
    pub enabled: bool,
    /// Seconds between autosaves.
    pub interval_secs: u64,
    /// Autosave file; defaults to a file in the temp directory.
    pub path: Option<PathBuf>,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 120,
            path: None,
        }
    }
}

/// Session settings loaded from `config.toml`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Undo history settings.
    pub undo: UndoConfig,
    /// Autosave settings.
    pub autosave: AutosaveConfig,
}

impl SessionConfig {
    /// Loads `explicit`, or the default config path. A missing file yields
    /// the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        match explicit.or_else(default_config_path) {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parses one config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the config as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })?;
        fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Sets the retained history length.
    pub fn undo_steps(mut self, steps: usize) -> Self {
        self.undo.steps = steps;
        self
    }

    /// Sets the snapshot memory budget in MiB.
    pub fn undo_memory_limit_mb(mut self, mb: usize) -> Self {
        self.undo.memory_limit_mb = mb;
        self
    }

    /// Stores undo snapshots as files in `dir`.
    pub fn disk_undo(mut self, dir: impl Into<PathBuf>) -> Self {
        self.undo.storage = StorageKind::Disk;
        self.undo.disk_dir = Some(dir.into());
        self
    }

    /// Enables or disables autosave.
    pub fn autosave_enabled(mut self, enabled: bool) -> Self {
        self.autosave.enabled = enabled;
        self
    }

    /// Sets the autosave interval.
    pub fn autosave_interval_secs(mut self, secs: u64) -> Self {
        self.autosave.interval_secs = secs;
        self
    }

    /// Sets the autosave file.
    pub fn autosave_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.autosave.path = Some(path.into());
        self
    }

    /// Ledger limits for these settings.
    pub fn ledger_limits(&self) -> LedgerLimits {
        LedgerLimits::new(
            self.undo.steps,
            self.undo.memory_limit_mb.saturating_mul(1024 * 1024),
        )
    }

    /// Ledger storage for these settings.
    pub fn undo_storage(&self) -> UndoStorage {
        match self.undo.storage {
            StorageKind::Memory => UndoStorage::Memory,
            StorageKind::Disk => UndoStorage::Disk {
                dir: self
                    .undo
                    .disk_dir
                    .clone()
                    .unwrap_or_else(|| std::env::temp_dir().join("docgraph").join("undo")),
            },
        }
    }

    /// Autosave file for these settings.
    pub fn autosave_file(&self) -> PathBuf {
        self.autosave
            .path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("docgraph").join("autosave.docg"))
    }

    /// Autosave interval as a duration.
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave.interval_secs)
    }
}

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {source}")]
    Serialize { source: toml::ser::Error },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// `config.toml` under the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("docgraph").join("config.toml"))
}
