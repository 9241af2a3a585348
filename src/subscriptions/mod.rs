//! Subscriptions: how a fired value reaches one callback.
//!
//! Every value offered to a subscription passes through the same pipeline:
//! - Liveness: cancelled subscriptions and dead observers are skipped
//! - Filter: an optional predicate gates the value
//! - Suspension: while suspended, values are merged into one pending value
//! - Once: a `once` subscription takes a single value and retires
//! - Sampling: leading/trailing coalescing within a time window
//! - Dispatch target: the callback runs inline or on an executor
//!
//! # Example
//!
//! ```ignore
//! let sub = signal
//!     .subscribe(&observer, |v: u32| println!("got {v}"))
//!     .filter(|v| *v > 10)
//!     .sample(Duration::from_millis(250));
//!
//! sub.set_suspended(true);
//! // ... fires accumulate ...
//! sub.set_suspended(false); // one dispatch with the latest value
//! ```

mod sampler;
mod subscription;

pub(crate) use subscription::{Callback, SubscriptionInner};
pub use subscription::Subscription;
