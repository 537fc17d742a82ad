//! Error types shared across the tracer.
//!
//! None of these ever reach the instrumented application: every failure is
//! logged and the request continues untouched.

use thiserror::Error;

/// Errors returned by a [`Collector`](crate::trace::Collector).
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The span record could not be handed to the dispatch queue.
    #[error("span dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// The collector refused to open or close the span.
    #[error("span rejected: {0}")]
    Rejected(String),
}

/// Errors from the bounded event queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Queue at capacity; the event was dropped.
    #[error("queue '{0}' is full, event dropped")]
    Full(&'static str),

    /// Worker has shut down.
    #[error("queue '{0}' is closed")]
    Closed(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CollectorError::from(DispatchError::Closed("spans"));
        assert_eq!(err.to_string(), "span dispatch failed: queue 'spans' is closed");

        let err = CollectorError::Rejected("missing host".into());
        assert!(err.to_string().contains("missing host"));
    }
}
