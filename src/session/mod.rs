#![forbid(unsafe_code)]

//! Explicit application context: the live graph, its history, the window
//! layer and the autosave worker.

mod autosave;
mod config;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::graph::Main;
use crate::storage::{read_file, write_file, ReadReport, WriteStats};
use crate::types::{DocError, Result};
use crate::undo::{swap_main, PushReport, StepDirection, SwapReport, UndoLedger, WindowHost};
use crate::wm::WindowManager;

pub use autosave::{AutosaveStatus, AutosaveWorker};
pub use config::{
    default_config_path, AutosaveConfig, ConfigError, SessionConfig, StorageKind, UndoConfig,
};

use autosave::AutosaveJob;

/// Name of the element pushed when a session starts or loads a file.
pub const ORIGINAL_STEP: &str = "Original";

/// One editing session.
///
/// Every mutation of the graph goes through [`Session::main_mut`] and is
/// recorded with [`Session::push`].
pub struct Session<H: WindowHost = WindowManager> {
    config: SessionConfig,
    main: Main,
    // joined before the ledger removes disk snapshots it may be copying
    autosave: Option<AutosaveWorker>,
    ledger: UndoLedger,
    host: H,
    last_autosave: Instant,
    file_path: Option<PathBuf>,
}

impl<H: WindowHost> std::fmt::Debug for Session<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("ids", &self.main.len())
            .field("history", &self.ledger.len())
            .field("cursor", &self.ledger.cursor())
            .field("file_path", &self.file_path)
            .finish()
    }
}

impl<H: WindowHost> Session<H> {
    /// Starts a session on an empty graph.
    pub fn new(config: SessionConfig, host: H) -> Result<Self> {
        Self::with_main(config, host, Main::new())
    }

    /// Starts a session on `main`.
    pub fn with_main(config: SessionConfig, mut host: H, main: Main) -> Result<Self> {
        let mut live = Main::new();
        swap_main(&mut live, main, &mut host);
        let mut ledger = UndoLedger::new(config.ledger_limits(), config.undo_storage());
        ledger.push(ORIGINAL_STEP, &live)?;
        let autosave = if config.autosave.enabled {
            Some(AutosaveWorker::spawn(config.autosave_file())?)
        } else {
            None
        };
        Ok(Self {
            config,
            main: live,
            autosave,
            ledger,
            host,
            last_autosave: Instant::now(),
            file_path: None,
        })
    }

    /// Starts a session on the document at `path`.
    pub fn open(config: SessionConfig, host: H, path: &Path) -> Result<Self> {
        let outcome = read_file(path)?;
        let mut session = Self::with_main(config, host, outcome.main)?;
        session.file_path = Some(path.to_path_buf());
        info!(path = %path.display(), ids = session.main.len(), "session.open");
        Ok(session)
    }

    /// Settings the session was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Live graph.
    pub fn main(&self) -> &Main {
        &self.main
    }

    /// Live graph for editing; record the edit with [`Session::push`].
    pub fn main_mut(&mut self) -> &mut Main {
        &mut self.main
    }

    /// Window layer.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable window layer.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Undo history.
    pub fn ledger(&self) -> &UndoLedger {
        &self.ledger
    }

    /// Document file last opened or saved.
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Records the live graph as history step `name`.
    pub fn push(&mut self, name: &str) -> Result<PushReport> {
        self.ledger.push(name, &self.main)
    }

    /// Steps one element back.
    pub fn undo(&mut self) -> Result<SwapReport> {
        self.ledger
            .step(StepDirection::Undo, &mut self.main, &mut self.host)
    }

    /// Steps one element forward.
    pub fn redo(&mut self) -> Result<SwapReport> {
        self.ledger
            .step(StepDirection::Redo, &mut self.main, &mut self.host)
    }

    /// Activates history element `index`.
    pub fn jump(&mut self, index: usize) -> Result<SwapReport> {
        self.ledger.jump(index, &mut self.main, &mut self.host)
    }

    /// Activates the newest history element named `name`.
    pub fn jump_to_name(&mut self, name: &str) -> Result<SwapReport> {
        self.ledger
            .jump_to_name(name, &mut self.main, &mut self.host)
    }

    /// Saves the live graph to `path`.
    pub fn save(&mut self, path: &Path) -> Result<WriteStats> {
        let stats = write_file(&self.main, path)?;
        self.file_path = Some(path.to_path_buf());
        info!(path = %path.display(), bytes = stats.bytes, "session.save");
        Ok(stats)
    }

    /// Replaces the live graph with the document at `path` and restarts the
    /// history.
    pub fn load(&mut self, path: &Path) -> Result<ReadReport> {
        let outcome = read_file(path)?;
        self.install(outcome.main)?;
        self.file_path = Some(path.to_path_buf());
        info!(path = %path.display(), ids = self.main.len(), "session.load");
        Ok(outcome.report)
    }

    fn install(&mut self, main: Main) -> Result<()> {
        let mut ledger = UndoLedger::new(self.config.ledger_limits(), self.config.undo_storage());
        ledger.push(ORIGINAL_STEP, &main)?;
        swap_main(&mut self.main, main, &mut self.host);
        self.ledger = ledger;
        Ok(())
    }

    /// Queues an autosave if the interval elapsed since the last one.
    pub fn autosave_tick(&mut self, now: Instant) -> Result<bool> {
        if self.autosave.is_none()
            || now.saturating_duration_since(self.last_autosave) < self.config.autosave_interval()
        {
            return Ok(false);
        }
        self.autosave_now()?;
        self.last_autosave = now;
        Ok(true)
    }

    /// Queues an autosave of the active history element.
    pub fn autosave_now(&mut self) -> Result<()> {
        let worker = self
            .autosave
            .as_ref()
            .ok_or(DocError::Invalid("autosave is disabled"))?;
        let elem = self
            .ledger
            .current()
            .ok_or(DocError::NotFound("undo step"))?;
        let job = match elem.path() {
            // read now, a later push may evict the file before the worker runs
            Some(path) => AutosaveJob(vec![Arc::from(fs::read(path)?)]),
            None => AutosaveJob(elem.memfile().payloads()),
        };
        worker.submit(job)?;
        debug!(step = elem.name(), "session.autosave.queued");
        Ok(())
    }

    /// Waits for queued autosaves; `None` when autosave is disabled.
    pub fn flush_autosave(&self) -> Option<AutosaveStatus> {
        self.autosave.as_ref().map(AutosaveWorker::wait_idle)
    }

    /// Existing autosave file for `config`, if any.
    pub fn recoverable_autosave(config: &SessionConfig) -> Option<PathBuf> {
        let path = config.autosave_file();
        path.is_file().then_some(path)
    }

    /// Loads the autosave file like an opened document.
    pub fn recover(&mut self) -> Result<ReadReport> {
        // the worker may still be replacing the file
        self.flush_autosave();
        let path = Self::recoverable_autosave(&self.config).ok_or(DocError::NotFound("autosave"))?;
        let outcome = read_file(&path)?;
        self.install(outcome.main)?;
        self.file_path = None;
        info!(path = %path.display(), ids = self.main.len(), "session.recover");
        Ok(outcome.report)
    }
}
