//! Backpressure: Depth and byte thresholds for bounded queues
//!
//! Each queue may carry two independent limits:
//! - **Depth**: Maximum number of items held
//! - **Bytes**: Maximum total size of held items
//!
//! When a new item would breach either limit, the configured [`OverflowPolicy`]
//! decides what happens: reject the newcomer, or evict the oldest held item to
//! make room. The guard only decides; the queue owning it performs the eviction.
//!
//! # Example
//!
//! ```
//! use warden_core_resilience::backpressure::{
//!     Admission, BackpressureConfig, BackpressureGuard, OverflowPolicy,
//! };
//!
//! let guard = BackpressureGuard::new(
//!     "alerts",
//!     BackpressureConfig {
//!         max_depth: Some(2),
//!         max_bytes: None,
//!         overflow: OverflowPolicy::RejectNew,
//!     },
//! );
//!
//! assert_eq!(guard.admit(128), Admission::Accept);
//! guard.record_enqueue(128);
//! guard.record_enqueue(128);
//! assert_eq!(guard.admit(128), Admission::Reject);
//!
//! guard.record_dequeue(128);
//! assert_eq!(guard.admit(128), Admission::Accept);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// What a full queue does with a new item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the new item; the held items are untouched
    #[default]
    RejectNew,
    /// Evict the earliest-enqueued item, then accept the new one
    DropOldest,
}

/// Configuration for backpressure thresholds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackpressureConfig {
    /// Maximum number of items allowed in the queue (`None` = unbounded)
    #[serde(default)]
    pub max_depth: Option<u64>,

    /// Maximum total bytes allowed in the queue (`None` = unbounded)
    #[serde(default)]
    pub max_bytes: Option<u64>,

    /// Policy applied once a limit is reached
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

/// Decision for one incoming item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Room available
    Accept,
    /// Full, and the policy refuses new items
    Reject,
    /// Full, and the caller must evict its oldest item before accepting
    EvictOldest,
}

/// Current state of a backpressure-monitored queue
#[derive(Debug, Clone, Serialize)]
pub struct BackpressureState {
    /// Current item count in the queue
    pub depth: u64,

    /// Current total bytes in the queue
    pub bytes: u64,

    /// Whether the queue is at or beyond one of its limits
    pub is_backpressured: bool,

    /// Fraction of the depth limit used (`None` when unbounded)
    pub depth_utilization: Option<f64>,
}

/// Tracks queue depth for a single queue and decides admissions.
///
/// Thread-safe via atomic operations, no locking required.
#[derive(Debug)]
pub struct BackpressureGuard {
    name: String,
    config: BackpressureConfig,
    depth: AtomicU64,
    bytes: AtomicU64,
}

impl BackpressureGuard {
    /// Create a new backpressure guard for a named queue
    pub fn new(name: impl Into<String>, config: BackpressureConfig) -> Self {
        Self {
            name: name.into(),
            config,
            depth: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    /// Whether one more item of `bytes` size fits without breaching a limit
    pub fn can_accept(&self, bytes: u64) -> bool {
        let depth = self.depth.load(Ordering::Relaxed);
        let size = self.bytes.load(Ordering::Relaxed);

        let depth_ok = self.config.max_depth.map_or(true, |max| depth < max);
        let bytes_ok = self
            .config
            .max_bytes
            .map_or(true, |max| size.saturating_add(bytes) <= max);

        depth_ok && bytes_ok
    }

    /// Decide what to do with an incoming item of `bytes` size
    pub fn admit(&self, bytes: u64) -> Admission {
        if self.can_accept(bytes) {
            return Admission::Accept;
        }

        match self.config.overflow {
            OverflowPolicy::RejectNew => Admission::Reject,
            // An empty queue cannot make room by evicting
            OverflowPolicy::DropOldest if self.depth.load(Ordering::Relaxed) == 0 => {
                Admission::Reject
            }
            OverflowPolicy::DropOldest => Admission::EvictOldest,
        }
    }

    /// Record one item being enqueued
    pub fn record_enqueue(&self, bytes: u64) {
        self.depth.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record one item leaving the queue (consumed, expired or evicted)
    pub fn record_dequeue(&self, bytes: u64) {
        // Use saturating subtraction to prevent underflow
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
        let _ = self
            .bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(bytes))
            });
    }

    /// Get the current state of this queue
    pub fn state(&self) -> BackpressureState {
        let depth = self.depth.load(Ordering::Relaxed);
        let bytes = self.bytes.load(Ordering::Relaxed);

        BackpressureState {
            depth,
            bytes,
            is_backpressured: !self.can_accept(0),
            depth_utilization: self
                .config
                .max_depth
                .filter(|max| *max > 0)
                .map(|max| depth as f64 / max as f64),
        }
    }

    /// Get the name of this queue
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration
    pub fn config(&self) -> &BackpressureConfig {
        &self.config
    }

    /// Reset counters
    pub fn reset(&self) {
        self.depth.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
    }
}
