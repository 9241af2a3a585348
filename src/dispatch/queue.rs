//! Thread-backed serial dispatch queue.

use super::{Executor, Job, Timed};
use crate::error::{Result, SignalError};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Label of the process-wide default queue.
pub const MAIN_QUEUE_LABEL: &str = "signals.main";

static MAIN_QUEUE: OnceLock<Arc<DispatchQueue>> = OnceLock::new();

/// Dispatch queue configuration.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Queue label, also used as the worker thread's name.
    pub label: String,
}

impl QueueConfig {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::labeled("signals.queue")
    }
}

enum Command {
    Run(Job),
    RunAt(Instant, Job),
    Shutdown,
}

/// A serial queue running jobs one at a time on a dedicated thread.
///
/// Immediate jobs run in submission order. Delayed jobs run in deadline
/// order once their deadline has passed. Dropping the queue (or calling
/// [`shutdown`](Self::shutdown)) finishes the immediate jobs already
/// submitted and discards pending delayed jobs.
pub struct DispatchQueue {
    label: String,
    sender: Sender<Command>,
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchQueue {
    /// Create a queue and start its worker thread.
    pub fn new(config: QueueConfig) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let worker_label = config.label.clone();
        let worker = thread::Builder::new()
            .name(config.label.clone())
            .spawn(move || run_worker(&worker_label, receiver))?;

        debug!(label = %config.label, "dispatch queue started");

        Ok(Self {
            label: config.label,
            sender,
            closed: AtomicBool::new(false),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// The process-wide default queue, created on first use.
    ///
    /// Sampled subscriptions without a dispatch target time their windows
    /// and deliver trailing values here.
    pub fn main() -> Result<Arc<DispatchQueue>> {
        if let Some(queue) = MAIN_QUEUE.get() {
            return Ok(Arc::clone(queue));
        }
        let queue = Arc::new(DispatchQueue::new(QueueConfig::labeled(MAIN_QUEUE_LABEL))?);
        Ok(Arc::clone(MAIN_QUEUE.get_or_init(|| queue)))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the worker after the immediate jobs already submitted.
    ///
    /// Blocks until the worker exits, unless called from the worker itself.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.sender.send(Command::Shutdown);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            join_unless_current(handle);
        }
        debug!(label = %self.label, "dispatch queue shut down");
    }

    fn submit(&self, command: Command) -> Result<()> {
        if self.is_closed() {
            return Err(SignalError::QueueClosed(self.label.clone()));
        }
        self.sender
            .send(command)
            .map_err(|_| SignalError::QueueClosed(self.label.clone()))
    }
}

impl Executor for DispatchQueue {
    fn execute(&self, job: Job) -> Result<()> {
        self.submit(Command::Run(job))
    }

    fn execute_after(&self, delay: Duration, job: Job) -> Result<()> {
        self.submit(Command::RunAt(Instant::now() + delay, job))
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for DispatchQueue {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.sender.send(Command::Shutdown);
        if let Some(handle) = self.worker.get_mut().take() {
            join_unless_current(handle);
        }
    }
}

/// A job may hold the last reference to its own queue.
fn join_unless_current(handle: JoinHandle<()>) {
    if handle.thread().id() != thread::current().id() {
        let _ = handle.join();
    }
}

fn run_worker(label: &str, receiver: Receiver<Command>) {
    let mut timers: BinaryHeap<Timed<Instant>> = BinaryHeap::new();
    let mut next_seq = 0u64;

    loop {
        while timers
            .peek()
            .is_some_and(|timed| timed.deadline <= Instant::now())
        {
            if let Some(timed) = timers.pop() {
                run_job(label, timed.job);
            }
        }

        let received = match timers.peek() {
            Some(timed) => receiver.recv_deadline(timed.deadline),
            None => receiver
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Command::Run(job)) => run_job(label, job),
            Ok(Command::RunAt(deadline, job)) => {
                timers.push(Timed {
                    deadline,
                    seq: next_seq,
                    job,
                });
                next_seq += 1;
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    if !timers.is_empty() {
        debug!(label, discarded = timers.len(), "dispatch queue exiting with pending timers");
    }
}

fn run_job(label: &str, job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        warn!(label, "job panicked on dispatch queue");
    }
}
