//! Guardians: recurring health checks with a failure ladder
//!
//! ```text
//!            failures >= degraded_after        failures >= failed_after
//!   Active ───────────────────────────> Degraded ─────────────────────> Failed
//!     ▲                                    │                              │
//!     └──────────── any success ───────────┴──────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A probe that reports whether its target is healthy
///
/// Implemented for any `Fn() -> impl Future<Output = anyhow::Result<()>>`.
#[async_trait]
pub trait HealthCheck: Send + Sync + 'static {
    async fn check(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> HealthCheck for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn check(&self) -> anyhow::Result<()> {
        (self)().await
    }
}

/// Run one probe with a deadline; panics and overruns are failures
pub(crate) async fn run_probe(check: &dyn HealthCheck, timeout: Duration) -> Result<(), String> {
    let guarded = AssertUnwindSafe(check.check()).catch_unwind();
    match tokio::time::timeout(timeout, guarded).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(format!("{:#}", e)),
        Ok(Err(_)) => Err("health check panicked".to_string()),
        Err(_) => Err(format!("health check timed out after {:?}", timeout)),
    }
}

/// The monitored target and its probe
#[derive(Clone)]
pub struct GuardianTarget {
    name: String,
    check: Arc<dyn HealthCheck>,
}

impl GuardianTarget {
    pub fn new(name: impl Into<String>, check: impl HealthCheck) -> Self {
        Self::from_arc(name, Arc::new(check))
    }

    pub fn from_arc(name: impl Into<String>, check: Arc<dyn HealthCheck>) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn check(&self) -> &dyn HealthCheck {
        self.check.as_ref()
    }
}

impl std::fmt::Debug for GuardianTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardianTarget")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Per-guardian overrides of the policy defaults
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardianOptions {
    pub check_interval: Option<Duration>,
    pub timeout: Option<Duration>,
}

impl GuardianOptions {
    pub fn every(check_interval: Duration) -> Self {
        Self {
            check_interval: Some(check_interval),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardianStatus {
    Active,
    Degraded,
    Failed,
}

/// Status implied by a consecutive failure count
pub fn ladder_status(failures: u32, degraded_after: u32, failed_after: u32) -> GuardianStatus {
    if failures >= failed_after {
        GuardianStatus::Failed
    } else if failures >= degraded_after {
        GuardianStatus::Degraded
    } else {
        GuardianStatus::Active
    }
}

/// A status change worth alerting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardianTransition {
    Degraded,
    Failed,
    Recovered,
}

/// Outcome of [`crate::Sentinel::check_guardian_now`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    Completed(GuardianStatus),
    AlreadyRunning,
    NotFound,
}

/// Last-known guardian state
#[derive(Debug, Clone, Serialize)]
pub struct GuardianReport {
    pub id: String,
    pub target: String,
    pub status: GuardianStatus,
    pub consecutive_failures: u32,
    pub total_checks: u64,
    pub total_failures: u64,
    pub check_interval_ms: u64,
    pub deployed_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub check_in_flight: bool,
}

#[derive(Debug)]
struct GuardianState {
    status: GuardianStatus,
    consecutive_failures: u32,
    total_checks: u64,
    total_failures: u64,
    last_checked_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Debug)]
pub(crate) struct Guardian {
    id: String,
    target: GuardianTarget,
    check_interval: Duration,
    timeout: Duration,
    deployed_at: DateTime<Utc>,
    state: Mutex<GuardianState>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the check ends or is cancelled
pub(crate) struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    pub(crate) fn new(flag: &'a AtomicBool) -> Self {
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Guardian {
    pub fn new(id: String, target: GuardianTarget, check_interval: Duration, timeout: Duration) -> Self {
        Self {
            id,
            target,
            check_interval,
            timeout,
            deployed_at: Utc::now(),
            state: Mutex::new(GuardianState {
                status: GuardianStatus::Active,
                consecutive_failures: 0,
                total_checks: 0,
                total_failures: 0,
                last_checked_at: None,
                last_error: None,
            }),
            in_flight: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardianState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &GuardianTarget {
        &self.target
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn status(&self) -> GuardianStatus {
        self.lock().status
    }

    pub fn is_poisoned(&self) -> bool {
        self.state.is_poisoned()
    }

    /// Claim the check slot; `None` while another check is outstanding
    pub fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    /// Apply a check result to the ladder
    pub fn record(
        &self,
        result: Result<(), String>,
        degraded_after: u32,
        failed_after: u32,
    ) -> (GuardianStatus, Option<GuardianTransition>) {
        let mut state = self.lock();
        let previous = state.status;
        state.total_checks += 1;
        state.last_checked_at = Some(Utc::now());

        match result {
            Ok(()) => {
                state.consecutive_failures = 0;
                state.last_error = None;
            }
            Err(e) => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                state.total_failures += 1;
                state.last_error = Some(e);
            }
        }

        let next = ladder_status(state.consecutive_failures, degraded_after, failed_after);
        state.status = next;

        let transition = match (previous, next) {
            (prev, GuardianStatus::Failed) if prev != GuardianStatus::Failed => {
                Some(GuardianTransition::Failed)
            }
            (GuardianStatus::Active, GuardianStatus::Degraded) => Some(GuardianTransition::Degraded),
            (prev, GuardianStatus::Active) if prev != GuardianStatus::Active => {
                Some(GuardianTransition::Recovered)
            }
            _ => None,
        };
        (next, transition)
    }

    pub fn report(&self) -> GuardianReport {
        let state = self.lock();
        GuardianReport {
            id: self.id.clone(),
            target: self.target.name().to_string(),
            status: state.status,
            consecutive_failures: state.consecutive_failures,
            total_checks: state.total_checks,
            total_failures: state.total_failures,
            check_interval_ms: self.check_interval.as_millis() as u64,
            deployed_at: self.deployed_at,
            last_checked_at: state.last_checked_at,
            last_error: state.last_error.clone(),
            check_in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guardian() -> Guardian {
        Guardian::new(
            "g1".to_string(),
            GuardianTarget::new("db", || async { Ok::<(), anyhow::Error>(()) }),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_ladder_status() {
        assert_eq!(ladder_status(0, 2, 5), GuardianStatus::Active);
        assert_eq!(ladder_status(1, 2, 5), GuardianStatus::Active);
        assert_eq!(ladder_status(2, 2, 5), GuardianStatus::Degraded);
        assert_eq!(ladder_status(5, 2, 5), GuardianStatus::Failed);
    }

    #[test]
    fn test_report_carries_schedule() {
        let report = guardian().report();
        assert_eq!(report.id, "g1");
        assert_eq!(report.target, "db");
        assert_eq!(report.check_interval_ms, 1_000);
        assert_eq!(report.status, GuardianStatus::Active);
    }

    #[test]
    fn test_transitions() {
        let g = guardian();
        let fail = || Err("down".to_string());

        assert_eq!(g.record(fail(), 2, 3), (GuardianStatus::Active, None));
        assert_eq!(
            g.record(fail(), 2, 3),
            (GuardianStatus::Degraded, Some(GuardianTransition::Degraded))
        );
        assert_eq!(
            g.record(fail(), 2, 3),
            (GuardianStatus::Failed, Some(GuardianTransition::Failed))
        );
        assert_eq!(g.record(fail(), 2, 3), (GuardianStatus::Failed, None));
        assert_eq!(
            g.record(Ok(()), 2, 3),
            (GuardianStatus::Active, Some(GuardianTransition::Recovered))
        );

        let report = g.report();
        assert_eq!(report.consecutive_failures, 0);
        assert_eq!(report.total_checks, 5);
        assert_eq!(report.total_failures, 4);
        assert!(report.last_error.is_none());
    }

    #[test]
    fn test_in_flight_slot_is_exclusive() {
        let g = guardian();
        let slot = g.try_begin();
        assert!(slot.is_some());
        assert!(g.try_begin().is_none());
        assert!(g.report().check_in_flight);

        drop(slot);
        assert!(g.try_begin().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_and_error() {
        let slow = || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<(), anyhow::Error>(())
        };
        let err = run_probe(&slow, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.contains("timed out"));

        let failing = || async { Err::<(), _>(anyhow::anyhow!("connection refused")) };
        assert_eq!(
            run_probe(&failing, Duration::from_secs(1)).await,
            Err("connection refused".to_string())
        );
    }
}
