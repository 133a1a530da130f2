//! Error taxonomy shared by every control-plane crate

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification every control-plane error maps onto.
///
/// Callers that only care about "why did this fail" match on the kind instead of
/// the crate-specific error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad target, command, topic or message
    Validation,
    /// Destination missing, circuit open, or system locked down
    Unavailable,
    /// A deadline elapsed before a reply arrived
    Timeout,
    /// The target's own logic failed
    Handler,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Unavailable => write!(f, "unavailable"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Handler => write!(f, "handler"),
        }
    }
}

/// Implemented by every crate-level error so it can be mapped onto [`ErrorKind`].
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Result of a call routed through a [`crate::CircuitBreaker`].
///
/// `Open` means the operation was never invoked; `Inner` carries the operation's
/// own error. Keeping them apart lets callers tell "unavailable" from "failed".
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// Circuit is open (or a half-open trial is already running)
    #[error("circuit '{breaker}' is open, retry in {retry_in:?}")]
    Open { breaker: String, retry_in: Duration },

    /// The protected operation ran and failed
    #[error("{0}")]
    Inner(E),
}

impl<E> CircuitError<E> {
    /// True when the call was rejected without running the operation
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    /// Map the inner error, keeping the open rejection untouched
    pub fn map_inner<F, T>(self, f: F) -> CircuitError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            CircuitError::Open { breaker, retry_in } => CircuitError::Open { breaker, retry_in },
            CircuitError::Inner(e) => CircuitError::Inner(f(e)),
        }
    }
}

impl<E: Classify> Classify for CircuitError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            CircuitError::Open { .. } => ErrorKind::Unavailable,
            CircuitError::Inner(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;

    impl Classify for Boom {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Handler
        }
    }

    #[test]
    fn test_open_is_unavailable() {
        let err: CircuitError<Boom> = CircuitError::Open {
            breaker: "db".to_string(),
            retry_in: Duration::from_secs(1),
        };
        assert!(err.is_open());
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_inner_keeps_its_kind() {
        let err = CircuitError::Inner(Boom);
        assert!(!err.is_open());
        assert_eq!(err.kind(), ErrorKind::Handler);
    }

    #[test]
    fn test_map_inner() {
        let err: CircuitError<&str> = CircuitError::Inner("bad");
        let mapped = err.map_inner(|s| s.len());
        assert!(matches!(mapped, CircuitError::Inner(3)));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::Unavailable.to_string(), "unavailable");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
    }
}
