//! Dead-Letter Queue: Bounded quarantine for undeliverable items
//!
//! When an item cannot be delivered (handler kept failing, destination circuit
//! open, queue full, item expired) it is diverted here instead of being dropped,
//! so an operator can inspect or replay it.
//!
//! # Design
//!
//! The queue is generic over the item type and purely in-memory. It is bounded:
//! once full, the oldest entry is evicted to make room, and the eviction is
//! counted in the statistics.
//!
//! # Example
//!
//! ```
//! use warden_core_resilience::dead_letter::{DeadLetterQueue, DeadLetterEntry, FailureReason};
//!
//! let mut dlq = DeadLetterQueue::new(1000); // max 1000 entries
//!
//! dlq.push(DeadLetterEntry::new(
//!     "payload-42",
//!     "subscriber:audit",
//!     FailureReason::RetriesExhausted { attempts: 3 },
//!     "connection refused",
//! ));
//!
//! assert_eq!(dlq.len(), 1);
//! let entries = dlq.drain();
//! assert_eq!(entries.len(), 1);
//! ```

use serde::Serialize;
use std::collections::VecDeque;
use std::time::SystemTime;

/// Reason an item was sent to the dead-letter queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// Delivery failed on every allowed attempt
    RetriesExhausted { attempts: u32 },

    /// The destination's circuit breaker was open
    CircuitOpen,

    /// The destination queue was full and rejects new items
    QueueFull,

    /// Evicted from a full queue to make room for a newer item
    Evicted,

    /// Time-to-live elapsed before the item was consumed
    Expired,

    /// No destination matched
    Unroutable,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::RetriesExhausted { attempts } => {
                write!(f, "retries exhausted after {} attempts", attempts)
            }
            FailureReason::CircuitOpen => write!(f, "circuit open"),
            FailureReason::QueueFull => write!(f, "queue full"),
            FailureReason::Evicted => write!(f, "evicted"),
            FailureReason::Expired => write!(f, "expired"),
            FailureReason::Unroutable => write!(f, "unroutable"),
        }
    }
}

/// A single dead-letter entry
#[derive(Debug, Clone)]
pub struct DeadLetterEntry<T> {
    /// The undeliverable item
    pub item: T,

    /// Destination that failed to take it (queue name, subscriber id, ...)
    pub destination: String,

    /// Why this item was dead-lettered
    pub failure_reason: FailureReason,

    /// Last error message
    pub last_error: String,

    /// When this item was dead-lettered
    pub dead_lettered_at: SystemTime,
}

impl<T> DeadLetterEntry<T> {
    pub fn new(
        item: T,
        destination: impl Into<String>,
        failure_reason: FailureReason,
        last_error: impl Into<String>,
    ) -> Self {
        Self {
            item,
            destination: destination.into(),
            failure_reason,
            last_error: last_error.into(),
            dead_lettered_at: SystemTime::now(),
        }
    }
}

/// In-memory dead-letter queue with bounded capacity.
///
/// Items that exceed the capacity are dropped (oldest first) to prevent
/// unbounded memory growth.
#[derive(Debug)]
pub struct DeadLetterQueue<T> {
    entries: VecDeque<DeadLetterEntry<T>>,
    max_capacity: usize,
    total_received: u64,
    total_dropped: u64,
}

impl<T> DeadLetterQueue<T> {
    /// Create a new dead-letter queue with the given maximum capacity
    pub fn new(max_capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_capacity.min(1024)),
            max_capacity,
            total_received: 0,
            total_dropped: 0,
        }
    }

    /// Push an entry into the dead-letter queue.
    ///
    /// If the queue is at capacity, the oldest entry is dropped.
    pub fn push(&mut self, entry: DeadLetterEntry<T>) {
        self.total_received += 1;

        if self.max_capacity == 0 {
            self.total_dropped += 1;
            return;
        }

        if self.entries.len() >= self.max_capacity {
            self.entries.pop_front();
            self.total_dropped += 1;
        }

        self.entries.push_back(entry);
    }

    /// Drain all entries from the queue
    pub fn drain(&mut self) -> Vec<DeadLetterEntry<T>> {
        self.entries.drain(..).collect()
    }

    /// Peek at all entries without removing them
    pub fn entries(&self) -> &VecDeque<DeadLetterEntry<T>> {
        &self.entries
    }

    /// Get entries for a specific destination
    pub fn entries_for(&self, destination: &str) -> Vec<&DeadLetterEntry<T>> {
        self.entries
            .iter()
            .filter(|e| e.destination == destination)
            .collect()
    }

    /// Number of entries currently in the queue
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get statistics
    pub fn stats(&self) -> DeadLetterStats {
        DeadLetterStats {
            current_count: self.entries.len(),
            max_capacity: self.max_capacity,
            total_received: self.total_received,
            total_dropped: self.total_dropped,
        }
    }
}

/// Statistics for the dead-letter queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadLetterStats {
    /// Current number of entries
    pub current_count: usize,
    /// Maximum capacity
    pub max_capacity: usize,
    /// Total entries ever received
    pub total_received: u64,
    /// Total entries dropped due to capacity overflow
    pub total_dropped: u64,
}
