//! Circuit breaker over session recovery rounds.
//!
//! Stops hammering an unreachable manager: after repeated failed recovery
//! rounds further attempts are suspended until the reset timeout elapses,
//! then a single round is let through.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ReconnectConfig;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Recovery attempts flow normally.
    Closed,

    /// Recovery attempts are suspended.
    Open,

    /// One trial round is allowed to test the manager again.
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed rounds that open the circuit.
    pub failure_threshold: u32,

    /// Time to wait before transitioning from open to half-open.
    pub reset_timeout: Duration,
}

impl From<&ReconnectConfig> for CircuitBreakerConfig {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: config.reset_timeout(),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

/// Closed/Open/HalfOpen breaker.
pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    config: CircuitBreakerConfig,
    failure_count: AtomicU32,
    trial_taken: AtomicBool,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            config,
            failure_count: AtomicU32::new(0),
            trial_taken: AtomicBool::new(false),
            opened_at: Mutex::new(None),
        }
    }

    /// Get the current state.
    pub fn state(&self) -> CircuitState {
        self.check_timeout();
        *self.state.read()
    }

    /// Check if a recovery round should be allowed.
    pub fn allow_request(&self) -> bool {
        self.check_timeout();

        match *self.state.read() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => !self.trial_taken.swap(true, Ordering::SeqCst),
        }
    }

    /// Record a successful recovery.
    pub fn record_success(&self) {
        let mut state = self.state.write();

        match *state {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                info!("Reconnect circuit closing after successful recovery");
                self.transition_to(&mut state, CircuitState::Closed);
            }
            CircuitState::Open => {
                debug!("Success recorded while reconnect circuit open");
            }
        }
    }

    /// Record a failed recovery.
    pub fn record_failure(&self) {
        let mut state = self.state.write();

        match *state {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    warn!(failures = failures, "Reconnect circuit opening, suspending recovery");
                    self.transition_to(&mut state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!("Reconnect circuit re-opening after half-open failure");
                self.transition_to(&mut state, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn check_timeout(&self) {
        if *self.state.read() != CircuitState::Open {
            return;
        }
        let Some(opened_at) = *self.opened_at.lock() else {
            return;
        };

        if opened_at.elapsed() >= self.config.reset_timeout {
            let mut state = self.state.write();
            if *state == CircuitState::Open {
                info!("Reconnect circuit transitioning to half-open after timeout");
                self.transition_to(&mut state, CircuitState::HalfOpen);
            }
        }
    }

    fn transition_to(&self, state: &mut CircuitState, new_state: CircuitState) {
        *state = new_state;

        match new_state {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
                *self.opened_at.lock() = None;
            }
            CircuitState::Open => {
                *self.opened_at.lock() = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                self.trial_taken.store(false, Ordering::SeqCst);
            }
        }
    }
}
