//! Core types shared by signals and subscriptions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Source of process-unique observer identifiers.
static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an observer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(pub u64);

impl fmt::Debug for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObserverId({})", self.0)
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a subscription within its signal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

struct ObserverToken {
    id: ObserverId,
}

/// Liveness token for a subscriber.
///
/// Signals only hold a weak reference to the token. The observer stays alive
/// while any clone of the handle exists; dropping the last clone ends every
/// subscription bound to it. Equality is identity, never value.
#[derive(Clone)]
pub struct Observer {
    token: Arc<ObserverToken>,
}

impl Observer {
    /// Create a new, live observer.
    pub fn new() -> Self {
        let id = ObserverId(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            token: Arc::new(ObserverToken { id }),
        }
    }

    /// The observer's identifier.
    pub fn id(&self) -> ObserverId {
        self.token.id
    }

    pub(crate) fn downgrade(&self) -> WeakObserver {
        WeakObserver {
            id: self.token.id,
            token: Arc::downgrade(&self.token),
        }
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Observer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.token, &other.token)
    }
}

impl Eq for Observer {}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Observer({})", self.token.id)
    }
}

/// Non-owning reference to an [`Observer`].
#[derive(Clone)]
pub(crate) struct WeakObserver {
    id: ObserverId,
    token: Weak<ObserverToken>,
}

impl WeakObserver {
    pub(crate) fn id(&self) -> ObserverId {
        self.id
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.token.strong_count() > 0
    }

    pub(crate) fn upgrade(&self) -> Option<Observer> {
        self.token.upgrade().map(|token| Observer { token })
    }

    /// Identity check that also holds after the observer died.
    pub(crate) fn refers_to(&self, observer: &Observer) -> bool {
        std::ptr::eq(self.token.as_ptr(), Arc::as_ptr(&observer.token))
    }
}

/// How a signal reports a broken precondition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicy {
    /// Panic in debug builds, do nothing in release builds.
    #[default]
    Assert,
    /// Always panic.
    Panic,
    /// Log a warning and carry on.
    Warn,
    /// Carry on silently.
    Ignore,
}

/// Signal configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Keep the last fired value for replay to late subscribers.
    /// Default: false
    pub retain_last_data: bool,

    /// Reporting of precondition violations.
    pub violation_policy: ViolationPolicy,
}

impl SignalConfig {
    /// Config for a signal that retains its last value.
    pub fn retaining() -> Self {
        Self {
            retain_last_data: true,
            ..Default::default()
        }
    }
}

/// Coalescing behaviour of a sampled subscription.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMode {
    /// Deliver the first value of a quiet period at once, then the latest
    /// value at the end of each busy window.
    ///
    /// A trailing flush starts a new window, so a value fired right after a
    /// flush is held until that window ends. Only a window that ends with
    /// nothing held lets the next value through immediately.
    #[default]
    LeadingAndTrailing,
    /// Only deliver the latest value at the end of each window.
    TrailingOnly,
}

/// Sampling settings attached to a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleConfig {
    pub interval: Duration,
    pub mode: SampleMode,
}

/// Point-in-time statistics for a signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalStats {
    /// Number of `fire` calls so far.
    pub fire_count: u64,
    /// Registered subscriptions, including ones awaiting pruning.
    pub subscriptions: usize,
    /// Distinct live observers.
    pub live_observers: usize,
    pub retains_last_data: bool,
}
