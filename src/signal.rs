//! The signal: a typed broadcaster to weakly-held observers.

use crate::error::Violation;
use crate::subscriptions::{Callback, Subscription, SubscriptionInner};
use crate::types::{
    Observer, SignalConfig, SignalStats, SubscriptionId, ViolationPolicy,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

type ViolationHandler = Arc<dyn Fn(&Violation) + Send + Sync>;

/// Retained value, kept together with the flag that governs it.
struct LastData<T> {
    retain: bool,
    value: Option<T>,
}

struct Shared<T> {
    /// Registration order is dispatch order.
    subscriptions: RwLock<Vec<Arc<SubscriptionInner<T>>>>,
    fire_count: AtomicU64,
    next_id: AtomicU64,
    last: Mutex<LastData<T>>,
    violation_policy: ViolationPolicy,
    violation_handler: RwLock<Option<ViolationHandler>>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let remaining = std::mem::take(self.subscriptions.get_mut());
        for sub in remaining {
            sub.detach();
            sub.dispose();
        }
    }
}

/// A typed event broadcaster.
///
/// Producers call [`fire`](Signal::fire); observers register callbacks with
/// the `subscribe*` family. The signal owns every registration and only
/// holds observers weakly, so a subscription ends by itself once its
/// [`Observer`] is dropped.
///
/// `Signal` is a handle: clones share the same subscriptions and state, and
/// everything is released when the last clone goes away.
pub struct Signal<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Signal<T> {
    /// Create a signal that does not retain fired values.
    pub fn new() -> Self {
        Self::with_config(SignalConfig::default())
    }

    /// Create a signal that retains its last fired value.
    pub fn retaining() -> Self {
        Self::with_config(SignalConfig::retaining())
    }

    pub fn with_config(config: SignalConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                subscriptions: RwLock::new(Vec::new()),
                fire_count: AtomicU64::new(0),
                next_id: AtomicU64::new(1),
                last: Mutex::new(LastData {
                    retain: config.retain_last_data,
                    value: None,
                }),
                violation_policy: config.violation_policy,
                violation_handler: RwLock::new(None),
            }),
        }
    }

    // --- Retained Data ---

    /// Number of times the signal has fired.
    pub fn fire_count(&self) -> u64 {
        self.shared.fire_count.load(Ordering::SeqCst)
    }

    pub fn retains_last_data(&self) -> bool {
        self.shared.last.lock().retain
    }

    /// Turning retention off discards the retained value immediately.
    pub fn set_retain_last_data(&self, retain: bool) {
        let mut last = self.shared.last.lock();
        last.retain = retain;
        if !retain {
            last.value = None;
        }
    }

    /// The last fired value, if the signal retains data and has fired since
    /// retention was enabled or the value was cleared.
    pub fn last_data(&self) -> Option<T> {
        self.shared.last.lock().value.clone()
    }

    /// Forget the retained value. The fire count and retention flag stay.
    pub fn clear_last_data(&self) {
        self.shared.last.lock().value = None;
    }

    // --- Precondition Reporting ---

    /// Report violations to `handler` instead of applying the configured
    /// [`ViolationPolicy`].
    pub fn set_violation_handler<F>(&self, handler: F)
    where
        F: Fn(&Violation) + Send + Sync + 'static,
    {
        *self.shared.violation_handler.write() = Some(Arc::new(handler));
    }

    pub fn clear_violation_handler(&self) {
        self.shared.violation_handler.write().take();
    }

    fn report(&self, violation: Violation) {
        let handler = self.shared.violation_handler.read().clone();
        if let Some(handler) = handler {
            handler(&violation);
            return;
        }

        match self.shared.violation_policy {
            ViolationPolicy::Assert => {
                if cfg!(debug_assertions) {
                    panic!("{violation}");
                }
            }
            ViolationPolicy::Panic => panic!("{violation}"),
            ViolationPolicy::Warn => warn!(%violation, "signal precondition violated"),
            ViolationPolicy::Ignore => {}
        }
    }

    fn require_retained(&self) {
        if !self.retains_last_data() {
            self.report(Violation::PastDataNotRetained);
        }
    }

    // --- Subscribing ---

    /// Subscribe `observer` to every future fire.
    pub fn subscribe<F>(&self, observer: &Observer, callback: F) -> Subscription<T>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Subscription::from_inner(self.register(observer, Arc::new(callback), false))
    }

    /// Subscribe `observer` to the next dispatched value only.
    pub fn subscribe_once<F>(&self, observer: &Observer, callback: F) -> Subscription<T>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Subscription::from_inner(self.register(observer, Arc::new(callback), true))
    }

    /// Subscribe and immediately replay the retained value, if any.
    ///
    /// The replay calls `callback` directly on this thread; filters,
    /// sampling and dispatch targets configured later do not apply to it.
    /// Subscribing on a signal that does not retain data is a precondition
    /// violation.
    pub fn subscribe_past<F>(&self, observer: &Observer, callback: F) -> Subscription<T>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.require_retained();
        let inner = self.register(observer, Arc::new(callback), false);
        if let Some(value) = self.last_data() {
            inner.invoke(value);
        }
        Subscription::from_inner(inner)
    }

    /// Replay the retained value once and cancel, or wait for the next
    /// dispatched value if nothing is retained.
    pub fn subscribe_past_once<F>(&self, observer: &Observer, callback: F) -> Subscription<T>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.require_retained();
        match self.last_data() {
            Some(value) => {
                let inner = self.register(observer, Arc::new(callback), false);
                inner.invoke(value);
                let subscription = Subscription::from_inner(inner);
                subscription.cancel();
                subscription
            }
            None => Subscription::from_inner(self.register(observer, Arc::new(callback), true)),
        }
    }

    fn register(
        &self,
        observer: &Observer,
        callback: Callback<T>,
        once: bool,
    ) -> Arc<SubscriptionInner<T>> {
        self.prune();

        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        let inner = Arc::new(SubscriptionInner::new(
            id,
            observer.downgrade(),
            callback,
            once,
        ));
        self.shared.subscriptions.write().push(Arc::clone(&inner));

        debug!(subscription = ?id, observer = %observer.id(), once, "subscribed");
        inner
    }

    // --- Firing ---

    /// Broadcast `value` to every live subscription, in registration order.
    ///
    /// Iterates over a snapshot: subscriptions added by callbacks during this
    /// fire wait for the next one, while subscriptions cancelled during this
    /// fire are skipped if not yet reached.
    pub fn fire(&self, value: T) {
        let count = self.shared.fire_count.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut last = self.shared.last.lock();
            last.value = if last.retain { Some(value.clone()) } else { None };
        }

        self.prune();
        let snapshot = self.shared.subscriptions.read().clone();
        trace!(fire = count, subscriptions = snapshot.len(), "firing signal");

        if let Some((last, rest)) = snapshot.split_last() {
            for sub in rest {
                sub.offer(value.clone());
            }
            last.offer(value);
        }
    }

    // --- Cancelling ---

    /// Cancel every subscription bound to `observer`.
    pub fn cancel_subscription(&self, observer: &Observer) {
        let removed = {
            let mut subs = self.shared.subscriptions.write();
            let mut removed = Vec::new();
            subs.retain(|sub| {
                if sub.is_bound_to(observer) {
                    sub.detach();
                } else if sub.is_live() {
                    return true;
                }
                removed.push(Arc::clone(sub));
                false
            });
            removed
        };

        debug!(observer = %observer.id(), removed = removed.len(), "cancelled observer subscriptions");
        retire(removed);
    }

    /// Cancel every subscription, including ones an in-progress fire has not
    /// reached yet.
    pub fn cancel_all_subscriptions(&self) {
        let removed = std::mem::take(&mut *self.shared.subscriptions.write());
        for sub in &removed {
            sub.detach();
        }

        debug!(removed = removed.len(), "cancelled all subscriptions");
        retire(removed);
    }

    /// Drop cancelled, finished and dead-observer subscriptions.
    fn prune(&self) {
        let removed = {
            let mut subs = self.shared.subscriptions.write();
            let mut removed = Vec::new();
            subs.retain(|sub| {
                let live = sub.is_live();
                if !live {
                    removed.push(Arc::clone(sub));
                }
                live
            });
            removed
        };

        if !removed.is_empty() {
            debug!(pruned = removed.len(), "pruned subscriptions");
            retire(removed);
        }
    }

    // --- Introspection ---

    /// The distinct live observers, in registration order.
    pub fn observers(&self) -> Vec<Observer> {
        self.prune();
        let subs = self.shared.subscriptions.read();
        let mut seen = HashSet::new();
        subs.iter()
            .filter(|sub| sub.is_live())
            .filter_map(|sub| sub.observer())
            .filter(|observer| seen.insert(observer.id()))
            .collect()
    }

    /// Registered subscriptions, including ones awaiting the next prune.
    pub fn subscription_count(&self) -> usize {
        self.shared.subscriptions.read().len()
    }

    pub fn stats(&self) -> SignalStats {
        SignalStats {
            fire_count: self.fire_count(),
            subscriptions: self.subscription_count(),
            live_observers: self.observers().len(),
            retains_last_data: self.retains_last_data(),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakSignal<T> {
        WeakSignal {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("fire_count", &self.shared.fire_count.load(Ordering::SeqCst))
            .field("subscriptions", &self.shared.subscriptions.read().len())
            .finish()
    }
}

/// Non-owning reference to a [`Signal`].
pub(crate) struct WeakSignal<T> {
    shared: Weak<Shared<T>>,
}

impl<T> WeakSignal<T> {
    pub(crate) fn upgrade(&self) -> Option<Signal<T>> {
        self.shared.upgrade().map(|shared| Signal { shared })
    }
}

impl<T> Clone for WeakSignal<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

/// Dispose hooks run outside the subscription lock.
fn retire<T>(removed: Vec<Arc<SubscriptionInner<T>>>) {
    for sub in removed {
        trace!(subscription = ?sub.id(), "retiring subscription");
        sub.dispose();
    }
}
