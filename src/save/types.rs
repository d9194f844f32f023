//! Task data and error types for the save queue
//!
//! A `Task` lives on the controlling thread for its whole life. The part of it
//! that has to cross over to a worker (kind, target, payload, failure) is
//! split off into a `Job`, which is `Send` and is moved to the worker on
//! dispatch and moved back on completion.

use chrono::{DateTime, Local};
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

use super::saveable::Save;
use super::target::StorageTarget;

/// Entity shared between the application and the manager.
///
/// Only ever touched from the controlling thread.
pub type SharedSave = Rc<RefCell<dyn Save>>;

/// Monotonic identifier handed out by a `SaveManager`
pub type TaskId = u64;

/// Current JSON envelope version (see `JsonSave`)
pub const CURRENT_SAVE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Load,
    Save,
    Delete,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Load => write!(f, "load"),
            TaskKind::Save => write!(f, "save"),
            TaskKind::Delete => write!(f, "delete"),
        }
    }
}

/// Error types for save/load operations
#[derive(Debug)]
pub enum SaveError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    /// Payload could not be decoded (truncated, malformed text, bad value)
    Corrupted(String),
    InvalidVersion(u32),
    /// Target name rejected at construction time
    InvalidTarget(String),
    /// Entity was already borrowed when the manager needed it
    EntityBusy,
    /// A backend or entity implementation panicked
    Panicked(String),
    /// The execution strategy lost its worker before the job came back
    WorkerLost,
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveError::Io(e) => write!(f, "IO error: {}", e),
            SaveError::Serialization(e) => write!(f, "Serialization error: {}", e),
            SaveError::Corrupted(msg) => write!(f, "Corrupted save data: {}", msg),
            SaveError::InvalidVersion(v) => write!(f, "Invalid save version: {}", v),
            SaveError::InvalidTarget(name) => write!(f, "Invalid storage target: {}", name),
            SaveError::EntityBusy => write!(f, "Entity is borrowed elsewhere"),
            SaveError::Panicked(msg) => write!(f, "Panicked: {}", msg),
            SaveError::WorkerLost => write!(f, "Worker thread went away before finishing"),
        }
    }
}

impl std::error::Error for SaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SaveError::Io(e) => Some(e),
            SaveError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SaveError {
    fn from(err: std::io::Error) -> Self {
        SaveError::Io(err)
    }
}

impl From<serde_json::Error> for SaveError {
    fn from(err: serde_json::Error) -> Self {
        SaveError::Serialization(err)
    }
}

impl SaveError {
    /// True when the underlying I/O error is "not found"
    pub fn is_not_found(&self) -> bool {
        matches!(self, SaveError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Runs `f`, turning a panic into `SaveError::Panicked`.
pub(crate) fn catch_panic<T>(f: impl FnOnce() -> Result<T, SaveError>) -> Result<T, SaveError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(SaveError::Panicked(msg))
        }
    }
}

/// One queued load/save/delete operation.
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    /// `None` for deletes
    pub entity: Option<SharedSave>,
    pub target: Arc<dyn StorageTarget>,
    /// Serialized entity for saves, bytes read for loads
    pub payload: Option<Vec<u8>>,
    /// `None` means success
    pub failure: Option<SaveError>,
    pub enqueued_at: DateTime<Local>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        kind: TaskKind,
        entity: Option<SharedSave>,
        target: Arc<dyn StorageTarget>,
    ) -> Self {
        Task {
            id,
            kind,
            entity,
            target,
            payload: None,
            failure: None,
            enqueued_at: Local::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("target", &self.target.name())
            .field("payload_len", &self.payload.as_ref().map(Vec::len))
            .field("failure", &self.failure)
            .finish()
    }
}

/// The worker-side half of a task.
pub struct Job {
    pub id: TaskId,
    pub kind: TaskKind,
    pub target: Arc<dyn StorageTarget>,
    pub payload: Option<Vec<u8>>,
    pub failure: Option<SaveError>,
}

impl Job {
    /// Performs the blocking storage operation for this job's kind.
    ///
    /// Never panics; every failure ends up in `self.failure`.
    pub fn run(&mut self) {
        let target = Arc::clone(&self.target);
        let result = match self.kind {
            TaskKind::Load => catch_panic(|| target.read()).map(|data| {
                self.payload = Some(data);
            }),
            TaskKind::Save => match self.payload.as_deref() {
                Some(data) => catch_panic(|| target.write(data)),
                None => Err(SaveError::Corrupted("save job has no payload".to_string())),
            },
            TaskKind::Delete => catch_panic(|| target.delete()),
        };

        if let Err(e) = result {
            self.failure = Some(e);
        }
    }

    /// A completed job standing in for one whose worker disappeared.
    pub(crate) fn lost(id: TaskId, kind: TaskKind, target: Arc<dyn StorageTarget>) -> Self {
        Job {
            id,
            kind,
            target,
            payload: None,
            failure: Some(SaveError::WorkerLost),
        }
    }
}

/// Bookkeeping an executor keeps about its single in-flight job
pub(crate) struct InFlight {
    pub id: TaskId,
    pub kind: TaskKind,
    pub target: Arc<dyn StorageTarget>,
}

impl InFlight {
    pub fn of(job: &Job) -> Self {
        InFlight {
            id: job.id,
            kind: job.kind,
            target: Arc::clone(&job.target),
        }
    }

    pub fn into_lost(self) -> Job {
        Job::lost(self.id, self.kind, self.target)
    }
}
