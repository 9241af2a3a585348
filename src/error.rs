//! Error types for signals and dispatch queues.

use thiserror::Error;

/// Main error type for queue and dispatch operations.
///
/// Producer-facing operations (`fire`, `subscribe`, `cancel`) never return
/// this; it surfaces from executors and is logged by the dispatch pipeline.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Dispatch queue closed: {0}")]
    QueueClosed(String),

    #[error("Failed to spawn dispatch worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Precondition violated: {0}")]
    Precondition(#[from] Violation),
}

/// A broken precondition on a signal operation.
///
/// How a violation is reported is decided by the signal's
/// [`ViolationPolicy`](crate::ViolationPolicy) or its injected handler.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("can't subscribe to past events on a signal that does not retain last data")]
    PastDataNotRetained,
}

/// Result type for queue and dispatch operations.
pub type Result<T> = std::result::Result<T, SignalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_converts_into_signal_error() {
        let err: SignalError = Violation::PastDataNotRetained.into();
        assert!(matches!(err, SignalError::Precondition(Violation::PastDataNotRetained)));
        assert!(err.to_string().starts_with("Precondition violated: can't subscribe"));
    }

    #[test]
    fn test_queue_closed_names_queue() {
        let err = SignalError::QueueClosed("signals.main".to_string());
        assert_eq!(err.to_string(), "Dispatch queue closed: signals.main");
    }
}
