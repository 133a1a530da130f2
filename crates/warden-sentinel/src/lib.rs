//! Warden Sentinel: monitoring for the control plane
//!
//! The Sentinel watches the system from the side. It never sits in a request
//! path and none of its operations fail the caller.
//!
//! # Components
//!
//! ```text
//!  record_metric ──> MetricSeries ──> ThresholdRule ──┐
//!                         │                          │
//!                         └──────> AnomalyDetector ──┤
//!  record_event ──> PatternMatcher ──────────────────┼──> AlertSink (+ bus)
//!  Scheduler ──> Guardians (Active/Degraded/Failed) ─┤
//!            └─> Canaries (pass/fail) ───────────────┘
//! ```
//!
//! The [`WatchLevel`] tightens the anomaly band and shortens the guardian
//! failure ladder as it rises.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use warden_sentinel::{GuardianOptions, GuardianTarget, Sentinel, SentinelPolicy, ThresholdRule};
//!
//! # async fn example() {
//! let sentinel = Sentinel::new(SentinelPolicy::default());
//!
//! sentinel.set_metric_threshold("cpu", ThresholdRule::gt(80.0, 95.0));
//! sentinel.record_metric("cpu", 42.0);
//!
//! sentinel.deploy_guardian(
//!     "database",
//!     GuardianTarget::new("postgres", || async { Ok::<(), anyhow::Error>(()) }),
//!     GuardianOptions::every(Duration::from_secs(10)),
//! );
//! # }
//! ```

pub mod alert;
pub mod anomaly;
pub mod canary;
pub mod daemon;
pub mod guardian;
pub mod metrics;
pub mod patterns;
pub mod policy;
pub mod scheduler;
pub mod watch;

pub use alert::{AlertKind, AlertSink, LogSink, SentinelAlert, Severity};
pub use anomaly::{Anomaly, AnomalyDetector, AnomalyKind, Baseline};
pub use canary::{CanaryReport, CanaryResult, CanarySpec};
pub use daemon::{
    GuardianCounts, MetricRecord, Sentinel, SentinelHealth, SentinelStatus, ALERT_TOPIC_PREFIX,
};
pub use guardian::{
    ladder_status, CheckOutcome, GuardianOptions, GuardianReport, GuardianStatus, GuardianTarget,
    GuardianTransition, HealthCheck,
};
pub use metrics::{
    Comparison, MetricSeries, MetricStats, ThresholdId, ThresholdRule, ThresholdViolation,
};
pub use patterns::{PatternMatcher, PatternSpec, SecurityEvent};
pub use policy::SentinelPolicy;
pub use scheduler::Scheduler;
pub use watch::WatchLevel;
