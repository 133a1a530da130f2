//! Warden Core Resilience: Pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! This crate provides the building blocks the control plane uses to keep one
//! failing destination from taking the rest of the process down with it:
//!
//! - **Circuit Breaker**: Fails fast once a destination keeps failing, with a single
//!   half-open trial after the cooldown
//! - **Dead-Letter Queue**: Bounded quarantine for messages that could not be delivered
//! - **Backpressure**: Depth and byte thresholds with an explicit overflow policy
//! - **Error classification**: The shared `ErrorKind` taxonomy every crate maps onto
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of modules, topics or metrics.
//! Time is read from `tokio::time::Instant`, so tests running on a paused tokio
//! clock control every cooldown deterministically.
//!
//! # Architecture
//!
//! ```text
//!        publish / directive
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Backpressure Guard                │  ← Bounded queues
//! │  (depth + bytes, reject-new/drop-old)   │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker                   │  ← Fail-fast protection
//! │  (opens on threshold, one trial call)   │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!        Handler / Module
//!               │
//!          On failure:
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Dead-Letter Queue                 │  ← Inspection, never silent drop
//! │  (bounded ring, oldest evicted first)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use warden_core_resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitError};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new(
//!     "billing",
//!     CircuitBreakerConfig {
//!         failure_threshold: 5,
//!         cooldown: Duration::from_secs(30),
//!     },
//! );
//!
//! let result = breaker
//!     .execute(|| async { Ok::<_, std::io::Error>(42) })
//!     .await;
//!
//! match result {
//!     Ok(value) => println!("value: {}", value),
//!     Err(CircuitError::Open { retry_in, .. }) => println!("unavailable for {:?}", retry_in),
//!     Err(CircuitError::Inner(e)) => println!("failed: {}", e),
//! }
//! # }
//! ```

pub mod backpressure;
pub mod circuit_breaker;
pub mod dead_letter;
pub mod error;

// Re-export main types for convenience
pub use backpressure::{Admission, BackpressureConfig, BackpressureGuard, BackpressureState, OverflowPolicy};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, CircuitStateKind,
};
pub use dead_letter::{DeadLetterEntry, DeadLetterQueue, DeadLetterStats, FailureReason};
pub use error::{CircuitError, Classify, ErrorKind};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use warden_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::backpressure::{Admission, BackpressureConfig, BackpressureGuard, OverflowPolicy};
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use super::dead_letter::{DeadLetterEntry, DeadLetterQueue, FailureReason};
    pub use super::error::{CircuitError, Classify, ErrorKind};
}
