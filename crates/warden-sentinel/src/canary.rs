//! Canaries: scheduled synthetic probes
//!
//! A canary has no ladder. Each run is a pass or a fail; the last result and the
//! running totals are kept for status reports.

use crate::guardian::{HealthCheck, InFlight};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Clone)]
pub struct CanarySpec {
    pub probe: Arc<dyn HealthCheck>,
    pub interval: Duration,
    /// Falls back to the policy check timeout
    pub timeout: Option<Duration>,
}

impl CanarySpec {
    pub fn new(probe: impl HealthCheck, interval: Duration) -> Self {
        Self {
            probe: Arc::new(probe),
            interval,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for CanarySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanarySpec")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanaryResult {
    pub passed: bool,
    pub checked_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CanaryReport {
    pub name: String,
    pub interval_ms: u64,
    pub passes: u64,
    pub failures: u64,
    pub last_result: Option<CanaryResult>,
}

#[derive(Debug, Default)]
struct CanaryState {
    passes: u64,
    failures: u64,
    last_result: Option<CanaryResult>,
}

#[derive(Debug)]
pub(crate) struct Canary {
    name: String,
    spec: CanarySpec,
    timeout: Duration,
    state: Mutex<CanaryState>,
    in_flight: AtomicBool,
}

impl Canary {
    pub fn new(name: String, spec: CanarySpec, default_timeout: Duration) -> Self {
        Self {
            timeout: spec.timeout.unwrap_or(default_timeout),
            name,
            spec,
            state: Mutex::new(CanaryState::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CanaryState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn probe(&self) -> &dyn HealthCheck {
        self.spec.probe.as_ref()
    }

    pub fn is_poisoned(&self) -> bool {
        self.state.is_poisoned()
    }

    pub fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight::new(&self.in_flight))
    }

    pub fn record(&self, result: Result<(), String>, duration: Duration) -> CanaryResult {
        let mut state = self.lock();
        let outcome = CanaryResult {
            passed: result.is_ok(),
            checked_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            error: result.err(),
        };
        if outcome.passed {
            state.passes += 1;
        } else {
            state.failures += 1;
        }
        state.last_result = Some(outcome.clone());
        outcome
    }

    pub fn report(&self) -> CanaryReport {
        let state = self.lock();
        CanaryReport {
            name: self.name.clone(),
            interval_ms: self.spec.interval.as_millis() as u64,
            passes: state.passes,
            failures: state.failures,
            last_result: state.last_result.clone(),
        }
    }
}
