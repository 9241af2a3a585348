//! Signals derived from other signals.
//!
//! - [`merge`] / [`merge3`]: fire on every upstream fire with the latest
//!   value of each source, `None` for sources that have not fired yet
//! - [`combine_latest`] / [`combine_latest3`]: fire once every source has
//!   fired, then on every upstream fire with the latest tuple
//!
//! Each combinator returns a [`Derived`], which owns its upstream
//! subscriptions and releases them when dropped. Derived signals retain
//! their last value, so late subscribers can use `subscribe_past`.
//!
//! # Example
//!
//! ```ignore
//! let width = Signal::<u32>::retaining();
//! let height = Signal::<u32>::retaining();
//! let area = combine_latest(&width, &height);
//!
//! area.subscribe(&observer, |(w, h)| println!("area: {}", w * h));
//! width.fire(3);
//! height.fire(4); // area: 12
//! ```

mod latest;
mod merge;

pub use latest::{combine_latest, combine_latest3};
pub use merge::{merge, merge3};

use crate::signal::{Signal, WeakSignal};
use crate::subscriptions::Subscription;
use crate::types::Observer;
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A registration on a source signal, type-erased.
trait Upstream: Send + Sync {
    fn release(&self);
}

impl<T: Send + 'static> Upstream for Subscription<T> {
    fn release(&self) {
        self.cancel();
    }
}

/// A signal computed from upstream signals.
///
/// Dereferences to the output [`Signal`]. Dropping the `Derived` cancels
/// its upstream subscriptions; clones of the output signal taken earlier
/// stay valid but receive nothing further.
pub struct Derived<T> {
    signal: Signal<T>,
    upstream: Vec<Box<dyn Upstream>>,
    /// Keeps the upstream subscriptions alive until drop.
    _observer: Observer,
}

impl<T> Derived<T> {
    pub fn signal(&self) -> &Signal<T> {
        &self.signal
    }
}

impl<T> Deref for Derived<T> {
    type Target = Signal<T>;

    fn deref(&self) -> &Signal<T> {
        &self.signal
    }
}

impl<T> Drop for Derived<T> {
    fn drop(&mut self) {
        for upstream in &self.upstream {
            upstream.release();
        }
    }
}

impl<T> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived")
            .field("signal", &self.signal)
            .field("upstream", &self.upstream.len())
            .finish()
    }
}

/// How an upstream source is followed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Replay {
    /// Always `subscribe_past`; the source must retain data.
    Required,
    /// `subscribe_past` when the source retains data, else `subscribe`.
    IfRetained,
}

/// Builder shared by all combinators: one state slot set, one output.
struct Wiring<L, O> {
    latest: Arc<Mutex<L>>,
    output: Signal<O>,
    observer: Observer,
    upstream: Vec<Box<dyn Upstream>>,
}

impl<L, O> Wiring<L, O>
where
    L: Send + 'static,
    O: Clone + Send + 'static,
{
    fn new(initial: L) -> Self {
        Self {
            latest: Arc::new(Mutex::new(initial)),
            output: Signal::retaining(),
            observer: Observer::new(),
            upstream: Vec::new(),
        }
    }

    /// Follow `source`: `store` records each value in the shared state,
    /// then the output fires with whatever `emit` derives from it.
    fn feed<S>(
        mut self,
        source: &Signal<S>,
        replay: Replay,
        store: fn(&mut L, S),
        emit: fn(&L) -> Option<O>,
    ) -> Self
    where
        S: Clone + Send + 'static,
    {
        let latest = Arc::clone(&self.latest);
        let output: WeakSignal<O> = self.output.downgrade();
        let callback = move |value: S| {
            let derived = {
                let mut latest = latest.lock();
                store(&mut latest, value);
                emit(&latest)
            };
            if let (Some(derived), Some(output)) = (derived, output.upgrade()) {
                output.fire(derived);
            }
        };

        let follow_past = match replay {
            Replay::Required => true,
            Replay::IfRetained => source.retains_last_data(),
        };
        let subscription = if follow_past {
            source.subscribe_past(&self.observer, callback)
        } else {
            source.subscribe(&self.observer, callback)
        };

        self.upstream.push(Box::new(subscription));
        self
    }

    fn finish(self) -> Derived<O> {
        Derived {
            signal: self.output,
            upstream: self.upstream,
            _observer: self.observer,
        }
    }
}
