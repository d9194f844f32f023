//! Execution strategies
//!
//! An executor runs one `Job` at a time off the controlling thread and hands
//! it back through a channel that the controlling thread drains without
//! blocking. Two flavours:
//!
//! - `ThreadPoolExecutor`: every job is an independent unit of work on a
//!   rayon pool; fine for desktop file systems.
//! - `DedicatedWorker`: a single long-lived thread that sleeps on a channel;
//!   suits platform stores that want all calls from the same thread.

use log::{debug, warn};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use super::types::{InFlight, Job, SaveError};

/// Runs jobs off the controlling thread, one at a time
pub trait Executor {
    fn name(&self) -> &'static str;

    /// Hands `job` to a worker and returns immediately.
    ///
    /// Callers never dispatch while a previous job is still out.
    fn dispatch(&mut self, job: Job);

    /// Returns the finished job, if the worker is done. Never blocks.
    fn poll(&mut self) -> Option<Job>;

    /// Blocks until the in-flight job is back. `None` when nothing is out.
    fn wait(&mut self) -> Option<Job>;

    fn is_busy(&self) -> bool;
}

// ============================================================
// Thread pool
// ============================================================

struct PoolCall {
    info: InFlight,
    done: Receiver<Job>,
}

/// Submits each job to a shared rayon pool
pub struct ThreadPoolExecutor {
    pool: Arc<rayon::ThreadPool>,
    pending: Option<PoolCall>,
}

impl ThreadPoolExecutor {
    /// Builds a private pool. `threads == 0` lets rayon pick.
    pub fn new(threads: usize) -> Result<Self, SaveError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("save-pool-{}", i))
            .build()
            .map_err(|e| SaveError::Io(std::io::Error::other(e)))?;
        Ok(Self::with_pool(Arc::new(pool)))
    }

    /// Shares an existing pool, e.g. between a game-save and a settings manager.
    pub fn with_pool(pool: Arc<rayon::ThreadPool>) -> Self {
        Self {
            pool,
            pending: None,
        }
    }
}

impl Executor for ThreadPoolExecutor {
    fn name(&self) -> &'static str {
        "thread-pool"
    }

    fn dispatch(&mut self, mut job: Job) {
        debug_assert!(self.pending.is_none(), "dispatch while a job is in flight");

        let info = InFlight::of(&job);
        let (tx, rx) = mpsc::sync_channel(1);
        self.pool.spawn(move || {
            job.run();
            // Receiver only goes away if the executor was dropped
            let _ = tx.send(job);
        });
        self.pending = Some(PoolCall { info, done: rx });
    }

    fn poll(&mut self) -> Option<Job> {
        let call = self.pending.as_ref()?;
        match call.done.try_recv() {
            Ok(job) => {
                self.pending = None;
                Some(job)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                let call = self.pending.take()?;
                warn!("pool worker dropped job {} without finishing", call.info.id);
                Some(call.info.into_lost())
            }
        }
    }

    fn wait(&mut self) -> Option<Job> {
        let call = self.pending.take()?;
        match call.done.recv() {
            Ok(job) => Some(job),
            Err(_) => {
                warn!("pool worker dropped job {} without finishing", call.info.id);
                Some(call.info.into_lost())
            }
        }
    }

    fn is_busy(&self) -> bool {
        self.pending.is_some()
    }
}

// ============================================================
// Dedicated worker thread
// ============================================================

enum WorkerMessage {
    Run(Job),
    Shutdown,
}

/// One background thread that blocks until it is handed a job
pub struct DedicatedWorker {
    jobs: Sender<WorkerMessage>,
    done: Receiver<Job>,
    handle: Option<JoinHandle<()>>,
    in_flight: Option<InFlight>,
}

impl DedicatedWorker {
    pub fn new() -> Result<Self, SaveError> {
        Self::named("save-worker")
    }

    pub fn named(thread_name: &str) -> Result<Self, SaveError> {
        let (jobs_tx, jobs_rx) = mpsc::channel::<WorkerMessage>();
        let (done_tx, done_rx) = mpsc::channel::<Job>();

        let handle = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || worker_loop(jobs_rx, done_tx))?;

        Ok(Self {
            jobs: jobs_tx,
            done: done_rx,
            handle: Some(handle),
            in_flight: None,
        })
    }
}

fn worker_loop(jobs: Receiver<WorkerMessage>, done: Sender<Job>) {
    debug!("save worker started");
    while let Ok(message) = jobs.recv() {
        match message {
            WorkerMessage::Run(mut job) => {
                job.run();
                if done.send(job).is_err() {
                    break;
                }
            }
            WorkerMessage::Shutdown => break,
        }
    }
    debug!("save worker stopped");
}

impl Executor for DedicatedWorker {
    fn name(&self) -> &'static str {
        "dedicated-worker"
    }

    fn dispatch(&mut self, job: Job) {
        debug_assert!(self.in_flight.is_none(), "dispatch while a job is in flight");

        let info = InFlight::of(&job);
        // A failed send hands the job back; the loss is reported on the next poll
        if self.jobs.send(WorkerMessage::Run(job)).is_err() {
            warn!("save worker is gone, job {} cannot run", info.id);
        }
        self.in_flight = Some(info);
    }

    fn poll(&mut self) -> Option<Job> {
        self.in_flight.as_ref()?;
        match self.done.try_recv() {
            Ok(job) => {
                self.in_flight = None;
                Some(job)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.in_flight.take().map(InFlight::into_lost),
        }
    }

    fn wait(&mut self) -> Option<Job> {
        let info = self.in_flight.take()?;
        match self.done.recv() {
            Ok(job) => Some(job),
            Err(_) => Some(info.into_lost()),
        }
    }

    fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }
}

impl Drop for DedicatedWorker {
    fn drop(&mut self) {
        let _ = self.jobs.send(WorkerMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("save worker panicked during shutdown");
            }
        }
    }
}
