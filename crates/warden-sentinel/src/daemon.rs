//! The Sentinel
//!
//! Ties metrics, thresholds, anomaly detection, pattern matching, guardians and
//! canaries together behind one handle. Every operation is best-effort: bad input
//! is logged and ignored, failing probes feed the guardian ladder, and nothing
//! here returns an error to the caller.

use crate::alert::{AlertKind, AlertSink, LogSink, SentinelAlert, Severity};
use crate::anomaly::{Anomaly, AnomalyDetector, Baseline};
use crate::canary::{Canary, CanaryReport, CanaryResult, CanarySpec};
use crate::guardian::{
    run_probe, CheckOutcome, Guardian, GuardianOptions, GuardianReport, GuardianStatus,
    GuardianTarget, GuardianTransition,
};
use crate::metrics::{MetricSeries, MetricStats, ThresholdId, ThresholdRule, ThresholdViolation};
use crate::patterns::{PatternMatcher, PatternSpec, SecurityEvent};
use crate::policy::SentinelPolicy;
use crate::scheduler::Scheduler;
use crate::watch::WatchLevel;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_bus::{MessageBus, MessageKind, PublishOptions};

/// Prefix of the bus topics alerts are published on
pub const ALERT_TOPIC_PREFIX: &str = "sentinel.alert";

/// Result of [`Sentinel::record_metric`]
#[derive(Debug, Clone, Serialize)]
pub struct MetricRecord {
    pub metric: String,
    /// False when the value was not finite and was dropped
    pub accepted: bool,
    pub stats: MetricStats,
    pub violation: Option<ThresholdViolation>,
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GuardianCounts {
    pub active: usize,
    pub degraded: usize,
    pub failed: usize,
}

/// Sentinel bookkeeping, not the health of monitored targets
#[derive(Debug, Clone, Serialize)]
pub struct SentinelStatus {
    pub watch_level: WatchLevel,
    pub sensitivity_factor: f64,
    pub uptime_secs: u64,
    pub metric_series: usize,
    pub samples_held: usize,
    pub metrics_ignored: u64,
    pub thresholds: usize,
    pub baselines: usize,
    pub patterns: usize,
    pub logged_events: usize,
    pub pattern_matches: u64,
    pub guardians: GuardianCounts,
    pub canaries: usize,
    pub scheduled_tasks: usize,
    pub alerts_raised: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentinelHealth {
    pub healthy: bool,
    pub poisoned_locks: Vec<String>,
    pub scheduled_tasks: usize,
    pub tasks_alive: usize,
}

struct SentinelInner {
    policy: SentinelPolicy,
    series: RwLock<HashMap<String, MetricSeries>>,
    thresholds: RwLock<HashMap<String, (ThresholdId, ThresholdRule)>>,
    detector: RwLock<AnomalyDetector>,
    patterns: Mutex<PatternMatcher>,
    guardians: RwLock<HashMap<String, Arc<Guardian>>>,
    canaries: RwLock<HashMap<String, Arc<Canary>>>,
    watch_level: AtomicU8,
    scheduler: Scheduler,
    sink: RwLock<Arc<dyn AlertSink>>,
    bus: Option<MessageBus>,
    started_at: Instant,
    alerts_raised: AtomicU64,
    metrics_ignored: AtomicU64,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|p| p.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|p| p.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// The Sentinel: metrics, anomalies, guardians and canaries
///
/// Cloning is cheap and clones share state. Scheduled guardians and canaries stop
/// when [`Sentinel::shutdown`] is called or the last handle is dropped.
#[derive(Clone)]
pub struct Sentinel {
    inner: Arc<SentinelInner>,
}

impl std::fmt::Debug for Sentinel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sentinel")
            .field("policy", &self.inner.policy)
            .field("watch_level", &self.watch_level())
            .finish_non_exhaustive()
    }
}

impl Default for Sentinel {
    fn default() -> Self {
        Self::new(SentinelPolicy::default())
    }
}

impl Sentinel {
    /// Create a Sentinel that only logs its alerts
    ///
    /// An invalid policy is replaced by the default one.
    pub fn new(policy: SentinelPolicy) -> Self {
        Self::build(policy, None)
    }

    /// Create a Sentinel that also publishes alerts on `bus`
    pub fn with_bus(policy: SentinelPolicy, bus: MessageBus) -> Self {
        Self::build(policy, Some(bus))
    }

    fn build(policy: SentinelPolicy, bus: Option<MessageBus>) -> Self {
        let policy = match policy.validate() {
            Ok(()) => policy,
            Err(e) => {
                warn!("Invalid Sentinel policy ({}), using defaults", e);
                SentinelPolicy::default()
            }
        };

        info!(
            "🛡️  Sentinel active | window: {} | spike: {}σ | ladder: {}/{}",
            policy.metric_window, policy.spike_threshold, policy.degraded_after, policy.failed_after
        );

        Self {
            inner: Arc::new(SentinelInner {
                detector: RwLock::new(AnomalyDetector::new(
                    policy.spike_threshold,
                    policy.sustained_samples,
                )),
                patterns: Mutex::new(PatternMatcher::new(policy.event_log_capacity)),
                policy,
                series: RwLock::new(HashMap::new()),
                thresholds: RwLock::new(HashMap::new()),
                guardians: RwLock::new(HashMap::new()),
                canaries: RwLock::new(HashMap::new()),
                watch_level: AtomicU8::new(WatchLevel::Passive.ordinal()),
                scheduler: Scheduler::new(),
                sink: RwLock::new(Arc::new(LogSink)),
                bus,
                started_at: Instant::now(),
                alerts_raised: AtomicU64::new(0),
                metrics_ignored: AtomicU64::new(0),
            }),
        }
    }

    pub fn policy(&self) -> &SentinelPolicy {
        &self.inner.policy
    }

    /// Route alerts to `sink` instead of the log
    pub fn set_alert_sink(&self, sink: Arc<dyn AlertSink>) {
        *write(&self.inner.sink) = sink;
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    /// Record one sample, evaluate its threshold and baseline
    pub fn record_metric(&self, name: &str, value: f64) -> MetricRecord {
        let inner = &self.inner;

        if !value.is_finite() {
            inner.metrics_ignored.fetch_add(1, Ordering::Relaxed);
            warn!(metric = name, value, "ignoring non-finite metric sample");
            return MetricRecord {
                metric: name.to_string(),
                accepted: false,
                stats: self.metric_stats(name).unwrap_or_default(),
                violation: None,
                anomalies: Vec::new(),
            };
        }

        let (stats, history) = {
            let mut series = write(&inner.series);
            let entry = series
                .entry(name.to_string())
                .or_insert_with(|| MetricSeries::new(inner.policy.metric_window));
            let stats = entry.record(value);
            let samples = entry.samples();
            let skip = samples.len().saturating_sub(inner.policy.sustained_samples);
            let history: Vec<f64> = samples.iter().skip(skip).copied().collect();
            (stats, history)
        };

        let violation = read(&inner.thresholds)
            .get(name)
            .and_then(|(_, rule)| rule.evaluate(name, value));

        let sensitivity = self.watch_level().sensitivity_factor();
        let anomalies = read(&inner.detector).analyze_scaled(name, &stats, &history, sensitivity);

        if let Some(violation) = &violation {
            inner.raise(SentinelAlert::new(
                AlertKind::Threshold,
                violation.severity,
                format!("metric:{}", name),
                violation.describe(),
            ));
        }
        for anomaly in &anomalies {
            inner.raise(SentinelAlert::new(
                AlertKind::Anomaly,
                anomaly.severity,
                format!("metric:{}", name),
                anomaly.describe(),
            ));
        }

        MetricRecord {
            metric: name.to_string(),
            accepted: true,
            stats,
            violation,
            anomalies,
        }
    }

    pub fn metric_stats(&self, name: &str) -> Option<MetricStats> {
        read(&self.inner.series).get(name).map(MetricSeries::stats)
    }

    /// Register or replace the threshold rule for `name`
    pub fn set_metric_threshold(&self, name: &str, rule: ThresholdRule) -> ThresholdId {
        let id = ThresholdId::new();
        write(&self.inner.thresholds).insert(name.to_string(), (id, rule));
        debug!(metric = name, threshold = %id, "threshold set");
        id
    }

    pub fn set_baseline(&self, metric: &str, baseline: Baseline) {
        write(&self.inner.detector).set_baseline(metric, baseline);
    }

    pub fn baseline(&self, metric: &str) -> Option<Baseline> {
        read(&self.inner.detector).baseline(metric).copied()
    }

    /// Run the anomaly detector at the current watch level without recording
    pub fn analyze(&self, metric: &str, observed: &MetricStats, history: &[f64]) -> Vec<Anomaly> {
        let sensitivity = self.watch_level().sensitivity_factor();
        read(&self.inner.detector).analyze_scaled(metric, observed, history, sensitivity)
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    pub fn register_pattern(&self, name: &str, spec: PatternSpec) {
        lock(&self.inner.patterns).register(name, spec);
        debug!(pattern = name, "pattern registered");
    }

    /// Log an event and return the names of patterns it completed
    pub fn record_event(&self, event: SecurityEvent) -> Vec<String> {
        let matched = lock(&self.inner.patterns).record(&event.kind, Instant::now());

        for name in &matched {
            self.inner.raise(SentinelAlert::new(
                AlertKind::Pattern,
                Severity::Warning,
                format!("pattern:{}", name),
                format!("pattern '{}' matched on '{}' from '{}'", name, event.kind, event.source),
            ));
        }
        matched
    }

    // ------------------------------------------------------------------
    // Guardians
    // ------------------------------------------------------------------

    /// Start polling `target`; the guardian is `Active` immediately
    ///
    /// An empty id gets a generated one. Deploying an existing id replaces it.
    pub fn deploy_guardian(&self, id: &str, target: GuardianTarget, options: GuardianOptions) -> String {
        let id = if id.trim().is_empty() {
            Uuid::new_v4().to_string()
        } else {
            id.to_string()
        };
        let interval = options
            .check_interval
            .unwrap_or_else(|| self.inner.policy.check_interval());
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.inner.policy.check_timeout());

        let guardian = Arc::new(Guardian::new(id.clone(), target, interval, timeout));
        write(&self.inner.guardians).insert(id.clone(), guardian.clone());

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .scheduler
            .schedule(guardian_key(&id), interval, move || {
                let weak: Weak<SentinelInner> = weak.clone();
                let guardian = guardian.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.check_guardian(&guardian).await;
                    }
                }
            });

        info!(guardian = %id, ?interval, "guardian deployed");
        id
    }

    /// Stop and forget a guardian
    pub fn recall_guardian(&self, id: &str) -> bool {
        self.inner.scheduler.cancel(&guardian_key(id));
        let removed = write(&self.inner.guardians).remove(id).is_some();
        if removed {
            info!(guardian = id, "guardian recalled");
        }
        removed
    }

    /// Last-known state; never runs a probe
    pub fn get_guardian_status(&self, id: &str) -> Option<GuardianReport> {
        read(&self.inner.guardians).get(id).map(|g| g.report())
    }

    pub fn guardians(&self) -> Vec<GuardianReport> {
        let mut reports: Vec<GuardianReport> =
            read(&self.inner.guardians).values().map(|g| g.report()).collect();
        reports.sort_by(|a, b| a.id.cmp(&b.id));
        reports
    }

    /// Run a check right away unless one is already outstanding
    pub async fn check_guardian_now(&self, id: &str) -> CheckOutcome {
        let guardian = read(&self.inner.guardians).get(id).cloned();
        match guardian {
            Some(guardian) => self.inner.check_guardian(&guardian).await,
            None => CheckOutcome::NotFound,
        }
    }

    // ------------------------------------------------------------------
    // Canaries
    // ------------------------------------------------------------------

    pub fn deploy_canary(&self, name: &str, spec: CanarySpec) -> String {
        let name = if name.trim().is_empty() {
            Uuid::new_v4().to_string()
        } else {
            name.to_string()
        };
        let interval = spec.interval;
        let canary = Arc::new(Canary::new(name.clone(), spec, self.inner.policy.check_timeout()));
        write(&self.inner.canaries).insert(name.clone(), canary.clone());

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .scheduler
            .schedule(canary_key(&name), interval, move || {
                let weak: Weak<SentinelInner> = weak.clone();
                let canary = canary.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.run_canary(&canary).await;
                    }
                }
            });

        info!(canary = %name, ?interval, "canary deployed");
        name
    }

    pub fn recall_canary(&self, name: &str) -> bool {
        self.inner.scheduler.cancel(&canary_key(name));
        write(&self.inner.canaries).remove(name).is_some()
    }

    pub fn canary_status(&self, name: &str) -> Option<CanaryReport> {
        read(&self.inner.canaries).get(name).map(|c| c.report())
    }

    /// Probe now; `None` if unknown or a probe is already running
    pub async fn run_canary_now(&self, name: &str) -> Option<CanaryResult> {
        let canary = read(&self.inner.canaries).get(name).cloned()?;
        self.inner.run_canary(&canary).await
    }

    // ------------------------------------------------------------------
    // Watch level
    // ------------------------------------------------------------------

    /// Set the watch level, returning the previous one
    pub fn set_watch_level(&self, level: WatchLevel) -> WatchLevel {
        let previous = self.inner.watch_level.swap(level.ordinal(), Ordering::AcqRel);
        let previous = WatchLevel::from_ordinal(previous).unwrap_or_default();
        if previous != level {
            info!(from = %previous, to = %level, "watch level changed");
        }
        previous
    }

    pub fn watch_level(&self) -> WatchLevel {
        self.inner.watch_level()
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    pub fn get_status(&self) -> SentinelStatus {
        let inner = &self.inner;
        let (metric_series, samples_held) = {
            let series = read(&inner.series);
            (series.len(), series.values().map(MetricSeries::len).sum())
        };
        let (patterns, logged_events, pattern_matches) = {
            let matcher = lock(&inner.patterns);
            (matcher.pattern_count(), matcher.logged_events(), matcher.total_matches())
        };
        let mut guardians = GuardianCounts::default();
        for guardian in read(&inner.guardians).values() {
            match guardian.status() {
                GuardianStatus::Active => guardians.active += 1,
                GuardianStatus::Degraded => guardians.degraded += 1,
                GuardianStatus::Failed => guardians.failed += 1,
            }
        }
        let level = self.watch_level();

        SentinelStatus {
            watch_level: level,
            sensitivity_factor: level.sensitivity_factor(),
            uptime_secs: inner.started_at.elapsed().as_secs(),
            metric_series,
            samples_held,
            metrics_ignored: inner.metrics_ignored.load(Ordering::Relaxed),
            thresholds: read(&inner.thresholds).len(),
            baselines: read(&inner.detector).baseline_count(),
            patterns,
            logged_events,
            pattern_matches,
            guardians,
            canaries: read(&inner.canaries).len(),
            scheduled_tasks: inner.scheduler.task_count(),
            alerts_raised: inner.alerts_raised.load(Ordering::Relaxed),
        }
    }

    /// Whether the Sentinel's own machinery is intact
    pub fn health_check(&self) -> SentinelHealth {
        let inner = &self.inner;
        let mut poisoned_locks = Vec::new();
        let mut flag = |name: &str, poisoned: bool| {
            if poisoned {
                poisoned_locks.push(name.to_string());
            }
        };
        flag("series", inner.series.is_poisoned());
        flag("thresholds", inner.thresholds.is_poisoned());
        flag("detector", inner.detector.is_poisoned());
        flag("patterns", inner.patterns.is_poisoned());
        flag("guardians", inner.guardians.is_poisoned());
        flag("canaries", inner.canaries.is_poisoned());
        flag("sink", inner.sink.is_poisoned());
        for guardian in read(&inner.guardians).values() {
            flag(&format!("guardian:{}", guardian.id()), guardian.is_poisoned());
        }
        for canary in read(&inner.canaries).values() {
            flag(&format!("canary:{}", canary.name()), canary.is_poisoned());
        }

        let scheduled_tasks = inner.scheduler.task_count();
        let tasks_alive = inner.scheduler.alive_count();

        SentinelHealth {
            healthy: poisoned_locks.is_empty() && tasks_alive == scheduled_tasks,
            poisoned_locks,
            scheduled_tasks,
            tasks_alive,
        }
    }

    /// Stop every guardian and canary task; returns how many were stopped
    pub fn shutdown(&self) -> usize {
        let stopped = self.inner.scheduler.shutdown();
        info!(tasks = stopped, "Sentinel stopped");
        stopped
    }
}

fn guardian_key(id: &str) -> String {
    format!("guardian:{}", id)
}

fn canary_key(name: &str) -> String {
    format!("canary:{}", name)
}

impl SentinelInner {
    fn watch_level(&self) -> WatchLevel {
        WatchLevel::from_ordinal(self.watch_level.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Guardian ladder thresholds at the current watch level
    ///
    /// The failed threshold stays above the degraded one at every level.
    fn ladder(&self) -> (u32, u32) {
        let level = self.watch_level();
        let degraded_after = level.scale_threshold(self.policy.degraded_after);
        let failed_after = level
            .scale_threshold(self.policy.failed_after)
            .max(degraded_after + 1);
        (degraded_after, failed_after)
    }

    async fn check_guardian(&self, guardian: &Guardian) -> CheckOutcome {
        let Some(_slot) = guardian.try_begin() else {
            debug!(guardian = guardian.id(), "check already in flight, skipping");
            return CheckOutcome::AlreadyRunning;
        };

        let result = run_probe(guardian.target().check(), guardian.timeout()).await;
        if let Err(e) = &result {
            warn!(guardian = guardian.id(), target = guardian.target().name(), error = %e, "guardian check failed");
        }

        let (degraded_after, failed_after) = self.ladder();
        let (status, transition) = guardian.record(result, degraded_after, failed_after);

        if let Some(transition) = transition {
            let report = guardian.report();
            let detail = report.last_error.as_deref().unwrap_or("recovered");
            let (kind, severity, message) = match transition {
                GuardianTransition::Degraded => (
                    AlertKind::GuardianDegraded,
                    Severity::Warning,
                    format!(
                        "guardian '{}' degraded after {} consecutive failures: {}",
                        report.id, report.consecutive_failures, detail
                    ),
                ),
                GuardianTransition::Failed => (
                    AlertKind::GuardianFailed,
                    Severity::Critical,
                    format!(
                        "guardian '{}' failed after {} consecutive failures: {}",
                        report.id, report.consecutive_failures, detail
                    ),
                ),
                GuardianTransition::Recovered => (
                    AlertKind::GuardianRecovered,
                    Severity::Info,
                    format!("guardian '{}' recovered", report.id),
                ),
            };
            self.raise(SentinelAlert::new(kind, severity, format!("guardian:{}", report.id), message));
        }

        CheckOutcome::Completed(status)
    }

    async fn run_canary(&self, canary: &Canary) -> Option<CanaryResult> {
        let Some(_slot) = canary.try_begin() else {
            debug!(canary = canary.name(), "probe already in flight, skipping");
            return None;
        };

        let started = Instant::now();
        let result = run_probe(canary.probe(), canary.timeout()).await;
        let outcome = canary.record(result, started.elapsed());

        if let Some(error) = &outcome.error {
            self.raise(SentinelAlert::new(
                AlertKind::CanaryFailed,
                Severity::Warning,
                format!("canary:{}", canary.name()),
                format!("canary '{}' failed: {}", canary.name(), error),
            ));
        }
        Some(outcome)
    }

    fn raise(&self, alert: SentinelAlert) {
        self.alerts_raised.fetch_add(1, Ordering::Relaxed);
        let sink = read(&self.sink).clone();
        sink.raise(&alert);

        let Some(bus) = self.bus.as_ref().filter(|_| self.policy.publish_alerts) else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime, alert not published");
            return;
        };
        let payload = match serde_json::to_value(&alert) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode alert");
                return;
            }
        };
        let topic = format!("{}.{}", ALERT_TOPIC_PREFIX, alert.severity);
        let priority = match alert.severity {
            Severity::Critical => 0,
            Severity::Warning => 3,
            Severity::Info => 6,
        };
        let bus = bus.clone();
        handle.spawn(async move {
            let options = PublishOptions::default()
                .with_kind(MessageKind::Alert)
                .with_priority(priority);
            if let Err(e) = bus.publish(&topic, payload, options).await {
                warn!(topic = %topic, error = %e, "failed to publish alert");
            }
        });
    }
}
