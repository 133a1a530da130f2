//! Priority queues
//!
//! Messages are held in a `BTreeMap` keyed by `(priority, sequence)`, which gives
//! a total dequeue order: lower priority number first, FIFO among equals.

use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use warden_core_resilience::{
    Admission, BackpressureConfig, BackpressureGuard, BackpressureState, OverflowPolicy,
};

/// Options for [`crate::MessageBus::create_queue`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Maximum number of held messages (`None` = unbounded)
    pub max_depth: Option<u64>,
    /// Maximum total message bytes (`None` = unbounded)
    pub max_bytes: Option<u64>,
    pub overflow: OverflowPolicy,
}

/// What happened to one enqueue attempt
#[derive(Debug, Default)]
pub(crate) struct EnqueueOutcome {
    /// Messages evicted to make room (drop-oldest)
    pub evicted: Vec<Message>,
    /// The new message, when it was refused
    pub rejected: Option<Message>,
}

#[derive(Debug)]
pub(crate) struct Queue {
    name: String,
    buffer: Mutex<BTreeMap<(u8, u64), Message>>,
    next_seq: AtomicU64,
    guard: BackpressureGuard,
}

impl Queue {
    pub fn new(name: impl Into<String>, options: QueueOptions) -> Self {
        let name = name.into();
        Self {
            guard: BackpressureGuard::new(
                name.clone(),
                BackpressureConfig {
                    max_depth: options.max_depth,
                    max_bytes: options.max_bytes,
                    overflow: options.overflow,
                },
            ),
            name,
            buffer: Mutex::new(BTreeMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(u8, u64), Message>> {
        self.buffer.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn enqueue(&self, message: Message) -> EnqueueOutcome {
        let mut buffer = self.lock();
        let mut outcome = EnqueueOutcome::default();
        let size = message.size_bytes();

        loop {
            match self.guard.admit(size) {
                Admission::Accept => break,
                Admission::Reject => {
                    outcome.rejected = Some(message);
                    return outcome;
                }
                Admission::EvictOldest => {
                    // Earliest enqueued, regardless of priority
                    let oldest = buffer.keys().min_by_key(|(_, seq)| *seq).copied();
                    match oldest.and_then(|key| buffer.remove(&key)) {
                        Some(evicted) => {
                            self.guard.record_dequeue(evicted.size_bytes());
                            outcome.evicted.push(evicted);
                        }
                        None => {
                            outcome.rejected = Some(message);
                            return outcome;
                        }
                    }
                }
            }
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.guard.record_enqueue(size);
        buffer.insert((message.priority(), seq), message);
        outcome
    }

    pub fn pop(&self) -> Option<Message> {
        let mut buffer = self.lock();
        let (_, message) = buffer.pop_first()?;
        self.guard.record_dequeue(message.size_bytes());
        Some(message)
    }

    pub fn depth(&self) -> usize {
        self.lock().len()
    }

    pub fn backpressure(&self) -> BackpressureState {
        self.guard.state()
    }

    pub fn overflow(&self) -> OverflowPolicy {
        self.guard.config().overflow
    }
}

/// Handle to a queue owned by the bus
#[derive(Debug, Clone)]
pub struct QueueHandle {
    pub(crate) queue: Arc<Queue>,
}

impl QueueHandle {
    pub fn name(&self) -> &str {
        self.queue.name()
    }

    pub fn depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn backpressure(&self) -> BackpressureState {
        self.queue.backpressure()
    }
}

/// Per-queue snapshot in bus statistics
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub name: String,
    pub depth: usize,
    pub overflow: OverflowPolicy,
    pub backpressure: BackpressureState,
}

impl From<&Queue> for QueueStats {
    fn from(queue: &Queue) -> Self {
        Self {
            name: queue.name().to_string(),
            depth: queue.depth(),
            overflow: queue.overflow(),
            backpressure: queue.backpressure(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(topic: &str, priority: u8) -> Message {
        Message::builder(topic, json!({})).priority(priority).build().unwrap()
    }

    #[test]
    fn test_priority_then_fifo_order() {
        let queue = Queue::new("q", QueueOptions::default());
        queue.enqueue(msg("low", 9));
        queue.enqueue(msg("mid.first", 5));
        queue.enqueue(msg("high", 1));
        queue.enqueue(msg("mid.second", 5));

        let order: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|m| m.topic().to_string())
            .collect();
        assert_eq!(order, vec!["high", "mid.first", "mid.second", "low"]);
    }

    #[test]
    fn test_reject_new_keeps_held_messages() {
        let queue = Queue::new(
            "q",
            QueueOptions {
                max_depth: Some(1),
                ..Default::default()
            },
        );
        assert!(queue.enqueue(msg("first", 5)).rejected.is_none());

        let outcome = queue.enqueue(msg("second", 5));
        assert_eq!(outcome.rejected.map(|m| m.topic().to_string()), Some("second".to_string()));
        assert_eq!(queue.depth(), 1);
    }

    #[test]
    fn test_drop_oldest_evicts_earliest_enqueued() {
        let queue = Queue::new(
            "q",
            QueueOptions {
                max_depth: Some(2),
                overflow: OverflowPolicy::DropOldest,
                ..Default::default()
            },
        );
        // Oldest has the most urgent priority; eviction still picks it
        queue.enqueue(msg("oldest", 0));
        queue.enqueue(msg("middle", 9));
        let outcome = queue.enqueue(msg("newest", 5));

        assert!(outcome.rejected.is_none());
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.evicted[0].topic(), "oldest");
        assert_eq!(queue.depth(), 2);
        assert_eq!(queue.pop().map(|m| m.topic().to_string()), Some("newest".to_string()));
    }

    #[test]
    fn test_backpressure_tracks_pop() {
        let queue = Queue::new(
            "q",
            QueueOptions {
                max_depth: Some(1),
                ..Default::default()
            },
        );
        queue.enqueue(msg("a", 5));
        assert!(queue.backpressure().is_backpressured);
        queue.pop();
        assert!(!queue.backpressure().is_backpressured);
        assert!(queue.pop().is_none());
    }
}
