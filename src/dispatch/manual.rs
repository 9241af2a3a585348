//! Host-pumped queue with a virtual clock.

use super::{Executor, Job, Timed};
use crate::error::{Result, SignalError};
use parking_lot::Mutex;
use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;

struct State {
    /// Virtual time since the queue was created.
    now: Duration,
    ready: VecDeque<Job>,
    timers: BinaryHeap<Timed<Duration>>,
    next_seq: u64,
    closed: bool,
}

/// An executor that only runs work when its owner asks it to.
///
/// Suited to hosts with their own run loop: call [`run_pending`] once per
/// loop iteration and [`advance`] as time passes. Time is virtual, so
/// sampling windows are fully deterministic.
///
/// [`run_pending`]: ManualQueue::run_pending
/// [`advance`]: ManualQueue::advance
pub struct ManualQueue {
    label: String,
    state: Mutex<State>,
}

impl ManualQueue {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: Mutex::new(State {
                now: Duration::ZERO,
                ready: VecDeque::new(),
                timers: BinaryHeap::new(),
                next_seq: 0,
                closed: false,
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Jobs ready to run plus timers not yet due.
    pub fn pending(&self) -> usize {
        let state = self.state.lock();
        state.ready.len() + state.timers.len()
    }

    /// Run ready jobs until none are left, including jobs they enqueue.
    ///
    /// Returns the number of jobs run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.state.lock().ready.pop_front();
            match job {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Move the clock forward, running timers in deadline order as they
    /// come due. Ready jobs run before each timer and after the last one.
    ///
    /// Returns the number of jobs run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        let mut ran = self.run_pending();

        loop {
            let due = {
                let mut state = self.state.lock();
                match state.timers.peek().map(|t| t.deadline) {
                    Some(deadline) if deadline <= target => {
                        state.now = state.now.max(deadline);
                        state.timers.pop().map(|timed| timed.job)
                    }
                    _ => {
                        state.now = target;
                        None
                    }
                }
            };
            match due {
                Some(job) => {
                    job();
                    ran += 1;
                    ran += self.run_pending();
                }
                None => return ran,
            }
        }
    }

    /// Reject further work and drop everything pending.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.ready.clear();
        state.timers.clear();
    }
}

impl Executor for ManualQueue {
    fn execute(&self, job: Job) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SignalError::QueueClosed(self.label.clone()));
        }
        state.ready.push_back(job);
        Ok(())
    }

    fn execute_after(&self, delay: Duration, job: Job) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SignalError::QueueClosed(self.label.clone()));
        }
        let deadline = state.now + delay;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.timers.push(Timed { deadline, seq, job });
        Ok(())
    }
}

impl std::fmt::Debug for ManualQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualQueue")
            .field("label", &self.label)
            .field("now", &self.now())
            .field("pending", &self.pending())
            .finish()
    }
}
