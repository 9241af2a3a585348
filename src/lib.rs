//! # Signals
//!
//! Typed event broadcasting to weakly-held observers.
//!
//! ## Core Concepts
//!
//! - **Signal**: a typed broadcaster; `fire` delivers a value to every live
//!   subscription in registration order
//! - **Observer**: a liveness token; when the last clone is dropped, its
//!   subscriptions end on their own
//! - **Subscription**: the per-observer registration, with optional filter,
//!   sampling, suspension and dispatch target
//! - **Executors**: scheduling contexts that run callbacks off the firing
//!   thread
//! - **Combinators**: merged and combined-latest signals built from others
//!
//! ## Example
//!
//! ```ignore
//! use signals::{Observer, Signal};
//!
//! let on_progress = Signal::<u32>::retaining();
//! let view = Observer::new();
//!
//! on_progress
//!     .subscribe(&view, |pct| println!("{pct}%"))
//!     .filter(|pct| pct % 10 == 0);
//!
//! on_progress.fire(10);
//!
//! // Late subscribers can catch up on the retained value.
//! on_progress.subscribe_past(&view, |pct| println!("caught up at {pct}%"));
//!
//! drop(view); // both subscriptions end here
//! ```

pub mod combinators;
pub mod dispatch;
pub mod error;
pub mod signal;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use combinators::{combine_latest, combine_latest3, merge, merge3, Derived};
pub use dispatch::{DispatchQueue, Executor, Job, ManualQueue, QueueConfig, MAIN_QUEUE_LABEL};
pub use error::{Result, SignalError, Violation};
pub use signal::Signal;
pub use subscriptions::Subscription;
pub use types::*;
