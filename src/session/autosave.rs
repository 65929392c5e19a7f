#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::primitives::io::write_atomic;
use crate::types::{DocError, Result};

/// Snapshot payloads handed to the autosave worker, written back to back.
pub(crate) struct AutosaveJob(pub(crate) Vec<Arc<[u8]>>);

/// Observable worker state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AutosaveStatus {
    /// Snapshots written so far.
    pub completed: u64,
    /// Jobs dropped because a newer one was queued behind them.
    pub coalesced: u64,
    /// Size of the last written snapshot.
    pub last_bytes: u64,
    /// Last failure, cleared by the next success.
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Shared {
    pending: usize,
    status: AutosaveStatus,
}

type SharedState = Arc<(Mutex<Shared>, Condvar)>;

/// Background thread writing snapshots to the autosave path.
///
/// Jobs are serialized on one thread; when several are queued only the newest
/// is written.
pub struct AutosaveWorker {
    path: PathBuf,
    sender: Option<Sender<AutosaveJob>>,
    state: SharedState,
    handle: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for AutosaveWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutosaveWorker")
            .field("path", &self.path)
            .finish()
    }
}

impl AutosaveWorker {
    /// Starts the worker writing to `path`.
    pub fn spawn(path: PathBuf) -> Result<Self> {
        let (sender, receiver): (Sender<AutosaveJob>, Receiver<AutosaveJob>) = mpsc::channel();
        let state: SharedState = Arc::new((Mutex::new(Shared::default()), Condvar::new()));
        let worker_state = Arc::clone(&state);
        let worker_path = path.clone();
        let handle = thread::Builder::new()
            .name("docgraph-autosave".into())
            .spawn(move || autosave_loop(&worker_path, receiver, worker_state))?;
        Ok(Self {
            path,
            sender: Some(sender),
            state,
            handle: Some(handle),
        })
    }

    /// File the worker writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn submit(&self, job: AutosaveJob) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or(DocError::Invalid("autosave worker stopped"))?;
        let (lock, _) = &*self.state;
        lock.lock().pending += 1;
        if sender.send(job).is_err() {
            lock.lock().pending -= 1;
            return Err(DocError::Invalid("autosave worker stopped"));
        }
        Ok(())
    }

    /// Blocks until every submitted job was handled.
    pub fn wait_idle(&self) -> AutosaveStatus {
        let (lock, cvar) = &*self.state;
        let mut shared = lock.lock();
        while shared.pending > 0 {
            cvar.wait(&mut shared);
        }
        shared.status.clone()
    }

    /// Current status without waiting.
    pub fn status(&self) -> AutosaveStatus {
        self.state.0.lock().status.clone()
    }
}

impl Drop for AutosaveWorker {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(path = %self.path.display(), "autosave.worker.panicked");
            }
        }
    }
}

fn write_job(path: &Path, job: &AutosaveJob) -> Result<u64> {
    write_atomic(path, |out| {
        for chunk in &job.0 {
            out.write_all(chunk)?;
        }
        Ok(())
    })
}

fn autosave_loop(path: &Path, receiver: Receiver<AutosaveJob>, state: SharedState) {
    while let Ok(first) = receiver.recv() {
        let mut job = first;
        let mut taken = 1;
        while let Ok(newer) = receiver.try_recv() {
            job = newer;
            taken += 1;
        }
        let result = write_job(path, &job);
        let (lock, cvar) = &*state;
        let mut shared = lock.lock();
        shared.pending = shared.pending.saturating_sub(taken);
        shared.status.coalesced += (taken - 1) as u64;
        match result {
            Ok(bytes) => {
                shared.status.completed += 1;
                shared.status.last_bytes = bytes;
                shared.status.last_error = None;
                debug!(path = %path.display(), bytes, "autosave.write");
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "autosave.write_failed");
                shared.status.last_error = Some(err.to_string());
            }
        }
        cvar.notify_all();
    }
}
