//! Scheduling contexts for subscription callbacks.
//!
//! A subscription without a dispatch target runs its callback on the firing
//! thread. A subscription with a target hands each callback to an
//! [`Executor`], which runs it later on its own terms:
//!
//! - [`DispatchQueue`]: a serial queue backed by one worker thread
//! - [`ManualQueue`]: a queue pumped by the host, with a virtual clock
//!
//! Sampling windows are also timed through an executor: the subscription's
//! target if it has one, otherwise [`DispatchQueue::main`].
//!
//! # Example
//!
//! ```ignore
//! let queue = Arc::new(DispatchQueue::new(QueueConfig::labeled("ui"))?);
//!
//! signal
//!     .subscribe(&observer, |v| println!("on the ui queue: {v}"))
//!     .on_queue(queue.clone());
//! ```

mod manual;
mod queue;

pub use manual::ManualQueue;
pub use queue::{DispatchQueue, QueueConfig, MAIN_QUEUE_LABEL};

use crate::error::Result;
use std::cmp::Ordering;
use std::time::Duration;

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A scheduling context that runs work asynchronously.
pub trait Executor: Send + Sync {
    /// Schedule `job` to run as soon as possible.
    fn execute(&self, job: Job) -> Result<()>;

    /// Schedule `job` to run once `delay` has passed.
    fn execute_after(&self, delay: Duration, job: Job) -> Result<()>;
}

/// A job waiting for its deadline.
///
/// Ordered so that `BinaryHeap` pops the earliest deadline first, and among
/// equal deadlines the job scheduled first.
pub(crate) struct Timed<D> {
    pub(crate) deadline: D,
    pub(crate) seq: u64,
    pub(crate) job: Job,
}

impl<D: Ord> PartialEq for Timed<D> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<D: Ord> Eq for Timed<D> {}

impl<D: Ord> PartialOrd for Timed<D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<D: Ord> Ord for Timed<D> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
