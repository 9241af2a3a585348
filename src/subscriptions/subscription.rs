//! Per-observer registration and its dispatch pipeline.

use super::sampler::{Lapse, Offer, Sampler};
use crate::dispatch::{DispatchQueue, Executor, Job};
use crate::error::Result;
use crate::types::{Observer, SampleConfig, SampleMode, SubscriptionId, WeakObserver};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

pub(crate) type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;
type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type Merger<T> = Arc<dyn Fn(T, Option<T>) -> T + Send + Sync>;
type DisposeHook = Box<dyn FnOnce() + Send + 'static>;

struct DisposeSlot {
    hook: Option<DisposeHook>,
    done: bool,
}

/// Dispatch settings, adjustable after subscribing.
struct Policy<T> {
    once: bool,
    filter: Option<Filter<T>>,
    target: Option<Arc<dyn Executor>>,
    suspended: bool,
    accumulated: Option<T>,
    merger: Option<Merger<T>>,
}

/// Internal subscription state, shared between the signal and handles.
pub(crate) struct SubscriptionInner<T> {
    id: SubscriptionId,
    /// None once cancelled.
    observer: Mutex<Option<WeakObserver>>,
    /// Set when a `once` subscription has taken its value.
    finished: AtomicBool,
    callback: Callback<T>,
    policy: Mutex<Policy<T>>,
    sampler: Mutex<Option<Sampler<T>>>,
    dispose: Mutex<DisposeSlot>,
}

impl<T: Send + 'static> SubscriptionInner<T> {
    pub(crate) fn new(
        id: SubscriptionId,
        observer: WeakObserver,
        callback: Callback<T>,
        once: bool,
    ) -> Self {
        Self {
            id,
            observer: Mutex::new(Some(observer)),
            finished: AtomicBool::new(false),
            callback,
            policy: Mutex::new(Policy {
                once,
                filter: None,
                target: None,
                suspended: false,
                accumulated: None,
                merger: None,
            }),
            sampler: Mutex::new(None),
            dispose: Mutex::new(DisposeSlot {
                hook: None,
                done: false,
            }),
        }
    }
}

impl<T> SubscriptionInner<T> {
    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Eligible for new values: not cancelled, not finished, observer alive.
    pub(crate) fn is_live(&self) -> bool {
        !self.finished.load(Ordering::SeqCst) && self.can_deliver()
    }

    /// Whether already accepted values may still reach the callback.
    fn can_deliver(&self) -> bool {
        self.observer
            .lock()
            .as_ref()
            .is_some_and(WeakObserver::is_alive)
    }

    pub(crate) fn observer(&self) -> Option<Observer> {
        self.observer.lock().as_ref().and_then(WeakObserver::upgrade)
    }

    pub(crate) fn is_bound_to(&self, observer: &Observer) -> bool {
        self.observer
            .lock()
            .as_ref()
            .is_some_and(|weak| weak.refers_to(observer))
    }

    /// Drop the observer reference. No further dispatch happens.
    pub(crate) fn detach(&self) {
        self.observer.lock().take();
    }

    /// Run the dispose hook, at most once.
    pub(crate) fn dispose(&self) {
        let hook = {
            let mut slot = self.dispose.lock();
            slot.done = true;
            slot.hook.take()
        };
        if let Some(hook) = hook {
            self.run_dispose_hook(hook);
        }
    }

    /// Store `hook`, or run it now if the subscription is already disposed.
    fn set_dispose_hook(&self, hook: DisposeHook) {
        let late = {
            let mut slot = self.dispose.lock();
            if slot.done {
                Some(hook)
            } else {
                slot.hook = Some(hook);
                None
            }
        };
        if let Some(hook) = late {
            self.run_dispose_hook(hook);
        }
    }

    fn run_dispose_hook(&self, hook: DisposeHook) {
        let target = self.policy.lock().target.clone();
        match target {
            Some(executor) => {
                if let Err(err) = executor.execute(hook) {
                    warn!(subscription = ?self.id, error = %err, "dispose hook dropped");
                }
            }
            None => hook(),
        }
    }
}

impl<T: Send + 'static> SubscriptionInner<T> {
    /// Call the callback directly, bypassing every policy.
    pub(crate) fn invoke(&self, value: T) {
        (self.callback)(value);
    }

    /// Entry point for a fired value: liveness, filter, then suspension.
    pub(crate) fn offer(self: &Arc<Self>, value: T) {
        if !self.is_live() {
            return;
        }

        let filter = self.policy.lock().filter.clone();
        if let Some(filter) = filter {
            if !filter(&value) {
                trace!(subscription = ?self.id, "value filtered out");
                return;
            }
        }

        {
            let mut guard = self.policy.lock();
            let policy = &mut *guard;
            if policy.suspended {
                let previous = policy.accumulated.take();
                let merged = match &policy.merger {
                    Some(merge) => merge(value, previous),
                    None => value,
                };
                policy.accumulated = Some(merged);
                return;
            }
        }

        self.dispatch(value);
    }

    /// Post-filter delivery: `once`, sampling, then the dispatch target.
    fn dispatch(self: &Arc<Self>, value: T) {
        let (once, target) = {
            let policy = self.policy.lock();
            (policy.once, policy.target.clone())
        };

        if once && self.finished.swap(true, Ordering::SeqCst) {
            return;
        }

        let offered = {
            let mut guard = self.sampler.lock();
            match guard.as_mut() {
                Some(sampler) => {
                    let offer = sampler.offer(value);
                    Ok((offer, sampler.epoch(), sampler.interval()))
                }
                None => Err(value),
            }
        };

        match offered {
            Err(value) => self.deliver(value, target.as_ref()),
            Ok((Offer::Deliver(value), epoch, interval)) => {
                // Queue the leading value ahead of the window timer.
                self.deliver(value, target.as_ref());
                self.schedule_lapse(epoch, interval, target);
            }
            Ok((Offer::OpenWindow, epoch, interval)) => self.schedule_lapse(epoch, interval, target),
            Ok((Offer::Held, _, _)) => {}
        }
    }

    fn deliver(&self, value: T, target: Option<&Arc<dyn Executor>>) {
        match target {
            Some(executor) => {
                let callback = Arc::clone(&self.callback);
                if let Err(err) = executor.execute(Box::new(move || callback(value))) {
                    warn!(subscription = ?self.id, error = %err, "dispatch dropped");
                }
            }
            None => (self.callback)(value),
        }
    }

    fn schedule_lapse(
        self: &Arc<Self>,
        epoch: u64,
        interval: Duration,
        target: Option<Arc<dyn Executor>>,
    ) {
        let inner = Arc::clone(self);
        let job: Job = Box::new(move || inner.window_lapsed(epoch));

        let scheduled = timer_executor(target).and_then(|timer| timer.execute_after(interval, job));
        if let Err(err) = scheduled {
            warn!(subscription = ?self.id, error = %err, "sampling window could not be timed");
            if let Some(sampler) = self.sampler.lock().as_mut() {
                sampler.reset();
            }
        }
    }

    /// Runs on the timer executor.
    fn window_lapsed(self: &Arc<Self>, epoch: u64) {
        let (lapse, next_epoch, interval) = {
            let mut guard = self.sampler.lock();
            let Some(sampler) = guard.as_mut() else {
                return;
            };
            let lapse = sampler.lapse(epoch);
            (lapse, sampler.epoch(), sampler.interval())
        };

        if let Lapse::Flush(value) = lapse {
            let target = self.policy.lock().target.clone();
            self.schedule_lapse(next_epoch, interval, target);
            if self.can_deliver() {
                trace!(subscription = ?self.id, "flushing sampled value");
                (self.callback)(value);
            }
        }
    }

    fn set_suspended(self: &Arc<Self>, suspended: bool) {
        let resumed = {
            let mut policy = self.policy.lock();
            policy.suspended = suspended;
            if suspended {
                None
            } else {
                policy.accumulated.take()
            }
        };

        if let Some(value) = resumed {
            if self.is_live() {
                self.dispatch(value);
            }
        }
    }
}

/// Sampling windows are timed on the dispatch target, or the main queue.
fn timer_executor(target: Option<Arc<dyn Executor>>) -> Result<Arc<dyn Executor>> {
    match target {
        Some(executor) => Ok(executor),
        None => {
            let main: Arc<dyn Executor> = DispatchQueue::main()?;
            Ok(main)
        }
    }
}

/// Handle to a registration on a [`Signal`](crate::Signal).
///
/// The signal owns the registration; handles are cheap to clone and only
/// configure or cancel it. Configuration methods consume and return the
/// handle so they can be chained straight off `subscribe`.
pub struct Subscription<T> {
    inner: Arc<SubscriptionInner<T>>,
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Subscription<T> {
    pub(crate) fn from_inner(inner: Arc<SubscriptionInner<T>>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> SubscriptionId {
        self.inner.id
    }

    /// The observer, if it is still alive and the subscription not cancelled.
    pub fn observer(&self) -> Option<Observer> {
        self.inner.observer()
    }

    /// Whether future fires can still reach this subscription.
    pub fn is_active(&self) -> bool {
        self.inner.is_live()
    }

    pub fn is_once(&self) -> bool {
        self.inner.policy.lock().once
    }

    /// Only dispatch values for which `predicate` returns true.
    /// Replaces any earlier filter.
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.inner.policy.lock().filter = Some(Arc::new(predicate));
        self
    }

    /// Coalesce dispatches to at most one per `interval`, leading and
    /// trailing edge.
    pub fn sample(self, interval: Duration) -> Self {
        self.sample_with(interval, SampleMode::default())
    }

    /// Coalesce dispatches with an explicit [`SampleMode`].
    ///
    /// Reconfiguring an already sampled subscription keeps its current
    /// window and held value.
    pub fn sample_with(self, interval: Duration, mode: SampleMode) -> Self {
        let config = SampleConfig { interval, mode };
        {
            let mut sampler = self.inner.sampler.lock();
            match sampler.as_mut() {
                Some(existing) => existing.reconfigure(config),
                None => *sampler = Some(Sampler::new(config)),
            }
        }
        self
    }

    /// Run the callback on `executor` instead of the firing thread.
    pub fn on_queue(self, executor: Arc<dyn Executor>) -> Self {
        self.inner.policy.lock().target = Some(executor);
        self
    }

    /// Combine values that arrive while suspended.
    ///
    /// `merger` receives the new value and the accumulated one, if any. The
    /// default keeps only the newest value. It runs under the subscription's
    /// lock and must not call back into this subscription.
    pub fn merge_data<F>(self, merger: F) -> Self
    where
        F: Fn(T, Option<T>) -> T + Send + Sync + 'static,
    {
        self.inner.policy.lock().merger = Some(Arc::new(merger));
        self
    }

    /// Run `hook` once when the subscription is cancelled or removed.
    ///
    /// On a subscription that was already disposed, such as the one
    /// returned by a replaying `subscribe_past_once`, the hook runs at once.
    /// Replaces any hook not yet run.
    pub fn on_dispose<F>(self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.set_dispose_hook(Box::new(hook));
        self
    }

    /// While suspended, fired values accumulate instead of dispatching.
    /// Resuming dispatches the accumulated value once.
    pub fn set_suspended(&self, suspended: bool) {
        self.inner.set_suspended(suspended);
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.policy.lock().suspended
    }

    /// Stop dispatching immediately. The signal drops the registration on
    /// its next prune. Work already handed to an executor still runs.
    pub fn cancel(&self) {
        self.inner.detach();
        self.inner.dispose();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observer = self.inner.observer.lock().as_ref().map(|w| w.id());
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("observer", &observer)
            .field("finished", &self.inner.finished.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ManualQueue;
    use std::sync::atomic::AtomicUsize;

    fn recording(observer: &Observer, once: bool) -> (Arc<SubscriptionInner<i32>>, Arc<Mutex<Vec<i32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let inner = Arc::new(SubscriptionInner::new(
            SubscriptionId(1),
            observer.downgrade(),
            Arc::new(move |v| sink.lock().push(v)),
            once,
        ));
        (inner, seen)
    }

    #[test]
    fn test_offer_respects_filter() {
        let observer = Observer::new();
        let (inner, seen) = recording(&observer, false);
        let handle = Subscription::from_inner(Arc::clone(&inner)).filter(|v| v % 2 == 0);

        for v in 1..=4 {
            inner.offer(v);
        }
        assert_eq!(*seen.lock(), vec![2, 4]);
        assert!(handle.is_active());
    }

    #[test]
    fn test_once_claims_single_value() {
        let observer = Observer::new();
        let (inner, seen) = recording(&observer, true);

        inner.offer(1);
        inner.offer(2);
        assert_eq!(*seen.lock(), vec![1]);
        assert!(!inner.is_live());
    }

    #[test]
    fn test_dead_observer_is_never_dispatched() {
        let observer = Observer::new();
        let (inner, seen) = recording(&observer, false);

        drop(observer);
        inner.offer(1);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_cancel_runs_dispose_hook_once() {
        let observer = Observer::new();
        let (inner, _) = recording(&observer, false);
        let disposed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&disposed);
        let handle = Subscription::from_inner(Arc::clone(&inner)).on_dispose(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.cancel();
        handle.cancel();
        inner.dispose();
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert!(!handle.is_active());
        assert!(handle.observer().is_none());
    }

    #[test]
    fn test_hook_on_disposed_subscription_runs_at_once() {
        let observer = Observer::new();
        let (inner, _) = recording(&observer, false);
        let disposed = Arc::new(AtomicUsize::new(0));
        inner.dispose();

        let counter = Arc::clone(&disposed);
        Subscription::from_inner(Arc::clone(&inner)).on_dispose(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        inner.dispose();
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_queued_dispatch_waits_for_executor() {
        let observer = Observer::new();
        let (inner, seen) = recording(&observer, false);
        let queue = Arc::new(ManualQueue::new("test"));
        let _handle = Subscription::from_inner(Arc::clone(&inner)).on_queue(queue.clone());

        inner.offer(7);
        assert!(seen.lock().is_empty());

        queue.run_pending();
        assert_eq!(*seen.lock(), vec![7]);
    }

    #[test]
    fn test_cancel_does_not_recall_queued_work() {
        let observer = Observer::new();
        let (inner, seen) = recording(&observer, false);
        let queue = Arc::new(ManualQueue::new("test"));
        let handle = Subscription::from_inner(Arc::clone(&inner)).on_queue(queue.clone());

        inner.offer(7);
        handle.cancel();
        inner.offer(8);

        queue.run_pending();
        assert_eq!(*seen.lock(), vec![7]);
    }
}
