//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker stops calling a destination that keeps failing. It has
//! three states:
//! - Closed: Normal operation, calls pass through and failures are counted
//! - Open: Destination is unhealthy, calls are rejected without running
//! - HalfOpen: Cooldown elapsed, exactly one trial call decides the next state
//!
//! The open -> half-open transition is evaluated lazily on the next call; there
//! is no background timer.

use super::error::CircuitError;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, calls pass through normally
    Closed,
    /// Circuit is open since `opened_at`, calls fail immediately
    Open { opened_at: Instant },
    /// Circuit is half-open, one trial call is allowed through
    HalfOpen,
}

impl CircuitState {
    /// Serializable discriminant without the timestamp
    pub fn kind(&self) -> CircuitStateKind {
        match self {
            CircuitState::Closed => CircuitStateKind::Closed,
            CircuitState::Open { .. } => CircuitStateKind::Open,
            CircuitState::HalfOpen => CircuitStateKind::HalfOpen,
        }
    }
}

/// Circuit state as reported in statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStateKind {
    Closed,
    Open,
    HalfOpen,
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Duration to wait before the next call becomes a half-open trial
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    /// Consecutive failure count while closed
    consecutive_failures: u32,
    /// Set while the single half-open trial is running
    trial_in_flight: bool,
    total_calls: u64,
    total_failures: u64,
    total_rejections: u64,
    times_opened: u64,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            trial_in_flight: false,
            total_calls: 0,
            total_failures: 0,
            total_rejections: 0,
            times_opened: 0,
        }
    }
}

/// Snapshot of a breaker for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitStateKind,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    /// Time left before the next call becomes a trial (open state only)
    pub retry_in_ms: Option<u64>,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub times_opened: u64,
}

/// Admission ticket for one protected call.
///
/// If the call future is dropped before it settles, a pending half-open trial
/// is treated as failed so the breaker can never stay stuck in half-open.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CallPermit<'_> {
    fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            debug!(breaker = %self.breaker.name, "half-open trial abandoned");
            self.breaker.on_failure(true);
        }
    }
}

/// Circuit breaker for protecting one destination
///
/// Clones share state, so a breaker can be handed to every caller of the same
/// destination.
///
/// # Example
/// ```no_run
/// use warden_core_resilience::{CircuitBreaker, CircuitBreakerConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let breaker = CircuitBreaker::new("inventory", CircuitBreakerConfig::default());
///
///     let result = breaker
///         .execute(|| async { Ok::<_, String>("stock: 12") })
///         .await;
///
///     assert!(result.is_ok());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState::new())),
        }
    }

    /// Create a new circuit breaker with default configuration
    pub fn new_default(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get the current state of the circuit breaker.
    ///
    /// An open circuit whose cooldown has elapsed is still reported as open until
    /// the next call turns it into a trial.
    pub fn get_state(&self) -> CircuitState {
        self.lock().state
    }

    /// Get current consecutive failure count
    pub fn get_failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Whether a call made right now would be rejected
    pub fn is_open(&self) -> bool {
        let state = self.lock();
        match state.state {
            CircuitState::Closed => false,
            CircuitState::Open { opened_at } => opened_at.elapsed() < self.config.cooldown,
            CircuitState::HalfOpen => state.trial_in_flight,
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.lock();
        state.state = CircuitState::Closed;
        state.consecutive_failures = 0;
        state.trial_in_flight = false;
    }

    /// Snapshot for diagnostics
    pub fn stats(&self) -> CircuitBreakerStats {
        let state = self.lock();
        let retry_in_ms = match state.state {
            CircuitState::Open { opened_at } => Some(
                self.config
                    .cooldown
                    .saturating_sub(opened_at.elapsed())
                    .as_millis() as u64,
            ),
            _ => None,
        };

        CircuitBreakerStats {
            name: self.name.to_string(),
            state: state.state.kind(),
            failure_count: state.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            cooldown_ms: self.config.cooldown.as_millis() as u64,
            retry_in_ms,
            total_calls: state.total_calls,
            total_failures: state.total_failures,
            total_rejections: state.total_rejections,
            times_opened: state.times_opened,
        }
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// Every `Err` returned by the operation counts as a failure. When the circuit
    /// is open the operation is not invoked and `CircuitError::Open` is returned.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire::<E>()?;

        match op().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(e) => {
                permit.fail();
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Check circuit state and admit or reject a call
    fn acquire<E>(&self) -> Result<CallPermit<'_>, CircuitError<E>> {
        let mut state = self.lock();

        match state.state {
            CircuitState::Closed => {
                state.total_calls += 1;
                Ok(CallPermit {
                    breaker: self,
                    trial: false,
                    settled: false,
                })
            }
            CircuitState::Open { opened_at } => {
                let elapsed = opened_at.elapsed();
                if elapsed >= self.config.cooldown {
                    debug!(breaker = %self.name, "cooldown elapsed, admitting half-open trial");
                    state.state = CircuitState::HalfOpen;
                    state.trial_in_flight = true;
                    state.total_calls += 1;
                    Ok(CallPermit {
                        breaker: self,
                        trial: true,
                        settled: false,
                    })
                } else {
                    state.total_rejections += 1;
                    Err(CircuitError::Open {
                        breaker: self.name.to_string(),
                        retry_in: self.config.cooldown - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if state.trial_in_flight {
                    state.total_rejections += 1;
                    Err(CircuitError::Open {
                        breaker: self.name.to_string(),
                        retry_in: Duration::ZERO,
                    })
                } else {
                    state.trial_in_flight = true;
                    state.total_calls += 1;
                    Ok(CallPermit {
                        breaker: self,
                        trial: true,
                        settled: false,
                    })
                }
            }
        }
    }

    /// Handle successful operation
    fn on_success(&self, trial: bool) {
        let mut state = self.lock();

        if trial {
            debug!(breaker = %self.name, "trial succeeded, closing circuit");
            state.trial_in_flight = false;
            state.state = CircuitState::Closed;
            state.consecutive_failures = 0;
            return;
        }

        // Only a trial may close an open circuit
        if state.state == CircuitState::Closed {
            state.consecutive_failures = 0;
        }
    }

    /// Handle failed operation
    fn on_failure(&self, trial: bool) {
        let mut state = self.lock();
        state.total_failures += 1;

        if trial {
            state.trial_in_flight = false;
            state.state = CircuitState::Open {
                opened_at: Instant::now(),
            };
            state.times_opened += 1;
            warn!(breaker = %self.name, "trial failed, circuit re-opened");
            return;
        }

        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures += 1;

                if state.consecutive_failures >= self.config.failure_threshold {
                    state.state = CircuitState::Open {
                        opened_at: Instant::now(),
                    };
                    state.consecutive_failures = 0;
                    state.times_opened += 1;
                    warn!(
                        breaker = %self.name,
                        threshold = self.config.failure_threshold,
                        "failure threshold reached, circuit opened"
                    );
                }
            }
            // A call admitted while closed that settles after the circuit moved on
            // does not change the newer state.
            CircuitState::Open { .. } | CircuitState::HalfOpen => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown: Duration::from_millis(cooldown_ms),
            },
        )
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), CircuitError<&'static str>> {
        breaker.execute(|| async { Err::<(), _>("boom") }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_closed_to_open() {
        let breaker = breaker(2, 100);

        assert!(matches!(fail(&breaker).await, Err(CircuitError::Inner("boom"))));
        assert_eq!(breaker.get_state(), CircuitState::Closed);
        assert_eq!(breaker.get_failure_count(), 1);

        assert!(fail(&breaker).await.is_err());
        match breaker.get_state() {
            CircuitState::Open { .. } => (),
            state => panic!("Expected Open state, got {:?}", state),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_never_invokes_operation() {
        let breaker = breaker(1, 1_000);
        let _ = fail(&breaker).await;

        let calls = AtomicUsize::new(0);
        let result = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;

        assert!(matches!(result, Err(CircuitError::Open { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.stats().total_rejections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let breaker = breaker(2, 50);
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert!(breaker.is_open());

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(!breaker.is_open());

        let result = breaker.execute(|| async { Ok::<_, &str>(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(breaker.get_state(), CircuitState::Closed);
        assert_eq!(breaker.get_failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens_with_fresh_timer() {
        let breaker = breaker(1, 50);
        let _ = fail(&breaker).await;

        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(matches!(fail(&breaker).await, Err(CircuitError::Inner(_))));
        assert!(breaker.is_open());

        // Cooldown restarted at the trial failure
        tokio::time::advance(Duration::from_millis(30)).await;
        let result = breaker.execute(|| async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitError::Open { .. })));
        assert_eq!(breaker.stats().times_opened, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial() {
        let breaker = breaker(1, 10);
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(10)).await;

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let trial_breaker = breaker.clone();
        let trial = tokio::spawn(async move {
            trial_breaker
                .execute(|| async move {
                    let _ = rx.await;
                    Ok::<_, &str>(())
                })
                .await
        });
        tokio::task::yield_now().await;

        // Trial is in flight; a second caller is rejected without running
        let second = breaker.execute(|| async { Ok::<_, &str>(()) }).await;
        assert!(matches!(second, Err(CircuitError::Open { .. })));

        tx.send(()).unwrap();
        assert!(trial.await.unwrap().is_ok());
        assert_eq!(breaker.get_state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_reopens() {
        let breaker = breaker(1, 10);
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(10)).await;

        let pending = breaker.execute(|| std::future::pending::<Result<(), &str>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(5), pending).await;
        assert!(timed_out.is_err());

        assert!(matches!(breaker.get_state(), CircuitState::Open { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let breaker = breaker(3, 10);
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        let _ = breaker.execute(|| async { Ok::<_, &str>(()) }).await;
        assert_eq!(breaker.get_failure_count(), 0);
        assert_eq!(breaker.get_state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_success_keeps_circuit_open() {
        let breaker = breaker(1, 30_000);

        let slow = breaker.execute(|| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, &str>("late")
        });
        let trip = async {
            tokio::task::yield_now().await;
            fail(&breaker).await
        };
        let (slow, trip) = tokio::join!(slow, trip);

        assert!(matches!(trip, Err(CircuitError::Inner("boom"))));
        assert_eq!(slow.unwrap(), "late");
        assert!(matches!(breaker.get_state(), CircuitState::Open { .. }));
        assert!(breaker.is_open());
        assert_eq!(breaker.stats().times_opened, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let breaker = breaker(1, 1_000);
        let _ = fail(&breaker).await;

        breaker.reset();

        assert_eq!(breaker.get_state(), CircuitState::Closed);
        assert_eq!(breaker.get_failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_report_retry_window() {
        let breaker = breaker(1, 1_000);
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(400)).await;

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitStateKind::Open);
        assert_eq!(stats.retry_in_ms, Some(600));
        assert_eq!(stats.total_failures, 1);
        assert_eq!(stats.name, "test");
    }
}
