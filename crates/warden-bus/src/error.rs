//! Error types for the warden-bus crate

use std::time::Duration;
use thiserror::Error;
use warden_core_resilience::{Classify, ErrorKind};

#[derive(Error, Debug, Clone)]
pub enum BusError {
    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Exchange already exists: {0}")]
    ExchangeExists(String),

    #[error("No route for topic: {0}")]
    NoRoute(String),

    #[error("Circuit open for {destination}, retry in {retry_in:?}")]
    CircuitOpen {
        destination: String,
        retry_in: Duration,
    },

    #[error("Request on '{topic}' timed out after {timeout:?}")]
    Timeout { topic: String, timeout: Duration },

    #[error("Reply channel closed for request on '{0}'")]
    ReplyDropped(String),

    #[error("Handler failed: {0}")]
    Handler(#[from] HandlerError),
}

impl Classify for BusError {
    fn kind(&self) -> ErrorKind {
        match self {
            BusError::InvalidTopic { .. }
            | BusError::InvalidPattern { .. }
            | BusError::InvalidMessage(_)
            | BusError::ExchangeExists(_) => ErrorKind::Validation,
            BusError::QueueNotFound(_)
            | BusError::NoRoute(_)
            | BusError::CircuitOpen { .. }
            | BusError::ReplyDropped(_) => ErrorKind::Unavailable,
            BusError::Timeout { .. } => ErrorKind::Timeout,
            BusError::Handler(_) => ErrorKind::Handler,
        }
    }
}

/// Failure reported by a subscriber's handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = BusError::InvalidTopic {
            topic: "a..b".to_string(),
            reason: "empty segment".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = BusError::CircuitOpen {
            destination: "sub-1".to_string(),
            retry_in: Duration::from_secs(1),
        };
        assert_eq!(err.kind(), ErrorKind::Unavailable);

        let err = BusError::Timeout {
            topic: "svc.ping".to_string(),
            timeout: Duration::from_millis(10),
        };
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let err: BusError = HandlerError::new("boom").into();
        assert_eq!(err.kind(), ErrorKind::Handler);
        assert_eq!(err.to_string(), "Handler failed: boom");
    }
}
