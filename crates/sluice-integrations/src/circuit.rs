//! Per-service circuit breakers.
//!
//! One breaker per external service, managed centrally and keyed by
//! service name. Closed counts consecutive failures; reaching the
//! threshold opens the circuit and calls fail fast without touching the
//! service. After the recovery timeout a single half-open trial is
//! admitted: success closes the circuit, failure reopens it and restarts
//! the timer. A trial that never resolves, because its future was
//! dropped, expires after the recovery timeout and a new trial is
//! admitted.

use std::{collections::HashMap, sync::Arc, time::Duration, time::Instant};

use sluice_core::{CircuitState, Clock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Circuit breaker tuning shared by all services.
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Consecutive failures that trip the breaker. Minimum 1.
    pub failure_threshold: u32,
    /// Time the breaker stays open before admitting a trial request.
    pub recovery_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, recovery_timeout: Duration::from_secs(60) }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    trial_started_at: Option<Instant>,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
            trial_started_at: None,
        }
    }
}

/// Manages circuit breakers for all external services.
///
/// Constructed once at startup and shared via `Arc`; the breaker table is
/// guarded by a single mutex, which is sufficient for the handful of
/// services this process talks to.
pub struct CircuitBreakerManager {
    config: CircuitConfig,
    clock: Arc<dyn Clock>,
    breakers: Mutex<HashMap<String, BreakerState>>,
}

impl CircuitBreakerManager {
    /// Creates a manager with the given tuning.
    pub fn new(config: CircuitConfig, clock: Arc<dyn Clock>) -> Self {
        let config = CircuitConfig {
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: config.recovery_timeout,
        };
        Self { config, clock, breakers: Mutex::new(HashMap::new()) }
    }

    /// Whether a request to `service` may proceed.
    ///
    /// Open circuits reject until the recovery timeout elapses, then admit
    /// exactly one half-open trial; concurrent callers keep failing fast
    /// until that trial resolves.
    pub async fn should_allow_request(&self, service: &str) -> bool {
        let mut breakers = self.breakers.lock().await;
        let breaker = breakers.entry(service.to_string()).or_default();

        match breaker.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = breaker
                    .opened_at
                    .map(|at| self.clock.now().saturating_duration_since(at))
                    .unwrap_or_default();
                if elapsed >= self.config.recovery_timeout {
                    breaker.state = CircuitState::HalfOpen;
                    breaker.trial_in_flight = true;
                    breaker.trial_started_at = Some(self.clock.now());
                    info!(service, "circuit breaker half-open, admitting trial request");
                    true
                } else {
                    debug!(service, "circuit breaker open, rejecting request");
                    false
                }
            },
            CircuitState::HalfOpen => {
                if breaker.trial_in_flight {
                    // A trial whose caller vanished must not wedge the
                    // breaker; reclaim it after the recovery timeout.
                    let trial_age = breaker
                        .trial_started_at
                        .map(|at| self.clock.now().saturating_duration_since(at))
                        .unwrap_or_default();
                    if trial_age >= self.config.recovery_timeout {
                        warn!(service, "trial request never resolved, admitting a new trial");
                        breaker.trial_started_at = Some(self.clock.now());
                        true
                    } else {
                        false
                    }
                } else {
                    breaker.trial_in_flight = true;
                    breaker.trial_started_at = Some(self.clock.now());
                    true
                }
            },
        }
    }

    /// Records a successful call to `service`.
    pub async fn record_success(&self, service: &str) {
        let mut breakers = self.breakers.lock().await;
        let breaker = breakers.entry(service.to_string()).or_default();

        match breaker.state {
            CircuitState::HalfOpen => {
                info!(service, "trial request succeeded, closing circuit breaker");
                *breaker = BreakerState::default();
            },
            CircuitState::Closed => {
                breaker.consecutive_failures = 0;
            },
            // A success racing the open transition does not reset the timer.
            CircuitState::Open => {},
        }
    }

    /// Records a failed call to `service`.
    pub async fn record_failure(&self, service: &str) {
        let mut breakers = self.breakers.lock().await;
        let breaker = breakers.entry(service.to_string()).or_default();

        match breaker.state {
            CircuitState::HalfOpen => {
                warn!(service, "trial request failed, reopening circuit breaker");
                breaker.state = CircuitState::Open;
                breaker.opened_at = Some(self.clock.now());
                breaker.trial_in_flight = false;
                breaker.trial_started_at = None;
            },
            CircuitState::Closed => {
                breaker.consecutive_failures += 1;
                if breaker.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        service,
                        failures = breaker.consecutive_failures,
                        "failure threshold reached, opening circuit breaker"
                    );
                    breaker.state = CircuitState::Open;
                    breaker.opened_at = Some(self.clock.now());
                }
            },
            CircuitState::Open => {},
        }
    }

    /// Current state of the breaker for `service`.
    pub async fn state(&self, service: &str) -> CircuitState {
        self.breakers
            .lock()
            .await
            .get(service)
            .map(|b| b.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Forces a breaker into a specific state.
    ///
    /// Used by the health monitor to record an open breaker on probe
    /// failure, and by tests to drive transitions directly.
    pub async fn force_state(&self, service: &str, state: CircuitState) {
        let mut breakers = self.breakers.lock().await;
        let breaker = breakers.entry(service.to_string()).or_default();
        breaker.state = state;
        breaker.trial_in_flight = false;
        breaker.trial_started_at = None;
        match state {
            CircuitState::Open => breaker.opened_at = Some(self.clock.now()),
            CircuitState::Closed => {
                breaker.consecutive_failures = 0;
                breaker.opened_at = None;
            },
            CircuitState::HalfOpen => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use sluice_core::TestClock;

    use super::*;

    fn manager(threshold: u32, timeout_secs: u64) -> (CircuitBreakerManager, TestClock) {
        let clock = TestClock::new();
        let manager = CircuitBreakerManager::new(
            CircuitConfig {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_secs(timeout_secs),
            },
            Arc::new(clock.clone()),
        );
        (manager, clock)
    }

    #[tokio::test]
    async fn closed_circuit_allows_requests() {
        let (manager, _clock) = manager(3, 60);
        assert!(manager.should_allow_request("user_service").await);
        assert_eq!(manager.state("user_service").await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_after_consecutive_failures() {
        let (manager, _clock) = manager(3, 60);

        manager.record_failure("user_service").await;
        manager.record_failure("user_service").await;
        assert!(manager.should_allow_request("user_service").await);

        manager.record_failure("user_service").await;
        assert_eq!(manager.state("user_service").await, CircuitState::Open);
        assert!(!manager.should_allow_request("user_service").await);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failure_count() {
        let (manager, _clock) = manager(3, 60);

        manager.record_failure("user_service").await;
        manager.record_failure("user_service").await;
        manager.record_success("user_service").await;
        manager.record_failure("user_service").await;
        manager.record_failure("user_service").await;

        assert_eq!(manager.state("user_service").await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_circuit_admits_trial_after_recovery_timeout() {
        let (manager, clock) = manager(1, 60);

        manager.record_failure("payment_service").await;
        assert!(!manager.should_allow_request("payment_service").await);

        clock.advance(Duration::from_secs(59));
        assert!(!manager.should_allow_request("payment_service").await);

        clock.advance(Duration::from_secs(1));
        assert!(manager.should_allow_request("payment_service").await);
        assert_eq!(manager.state("payment_service").await, CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn half_open_rejects_concurrent_callers() {
        let (manager, clock) = manager(1, 60);

        manager.record_failure("payment_service").await;
        clock.advance(Duration::from_secs(60));

        assert!(manager.should_allow_request("payment_service").await);
        assert!(!manager.should_allow_request("payment_service").await);
    }

    #[tokio::test]
    async fn trial_success_closes_circuit() {
        let (manager, clock) = manager(1, 60);

        manager.record_failure("user_service").await;
        clock.advance(Duration::from_secs(60));
        assert!(manager.should_allow_request("user_service").await);

        manager.record_success("user_service").await;
        assert_eq!(manager.state("user_service").await, CircuitState::Closed);
        assert!(manager.should_allow_request("user_service").await);
    }

    #[tokio::test]
    async fn trial_failure_reopens_and_restarts_timer() {
        let (manager, clock) = manager(1, 60);

        manager.record_failure("user_service").await;
        clock.advance(Duration::from_secs(60));
        assert!(manager.should_allow_request("user_service").await);

        manager.record_failure("user_service").await;
        assert_eq!(manager.state("user_service").await, CircuitState::Open);
        assert!(!manager.should_allow_request("user_service").await);

        clock.advance(Duration::from_secs(60));
        assert!(manager.should_allow_request("user_service").await);
    }

    #[tokio::test]
    async fn abandoned_trial_expires_and_a_new_trial_is_admitted() {
        let (manager, clock) = manager(1, 60);

        manager.record_failure("user_service").await;
        clock.advance(Duration::from_secs(60));

        // Trial admitted but its outcome is never recorded.
        assert!(manager.should_allow_request("user_service").await);
        assert!(!manager.should_allow_request("user_service").await);

        clock.advance(Duration::from_secs(59));
        assert!(!manager.should_allow_request("user_service").await);

        clock.advance(Duration::from_secs(1));
        assert!(manager.should_allow_request("user_service").await);

        manager.record_success("user_service").await;
        assert_eq!(manager.state("user_service").await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn services_have_independent_breakers() {
        let (manager, _clock) = manager(1, 60);

        manager.record_failure("user_service").await;

        assert!(!manager.should_allow_request("user_service").await);
        assert!(manager.should_allow_request("payment_service").await);
    }

    #[tokio::test]
    async fn force_state_overrides_current_state() {
        let (manager, _clock) = manager(5, 60);

        manager.force_state("communication_service", CircuitState::Open).await;
        assert!(!manager.should_allow_request("communication_service").await);

        manager.force_state("communication_service", CircuitState::Closed).await;
        assert!(manager.should_allow_request("communication_service").await);
    }

    #[tokio::test]
    async fn threshold_is_clamped_to_at_least_one() {
        let (manager, _clock) = manager(0, 60);

        manager.record_failure("user_service").await;
        assert_eq!(manager.state("user_service").await, CircuitState::Open);
    }
}
