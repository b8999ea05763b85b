//! Session health monitoring and recovery.
//!
//! Two checks decide whether the session must be re-established: the
//! event reader must still be running once login was validated, and a
//! session idle for longer than the ping timeout must answer a `Ping`.

use std::fmt;
use std::sync::Arc;

use ami_protocol::{Event, EventListener};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{error, info, instrument, warn};

use crate::config::{Credentials, SessionConfig};
use crate::error::{SessionError, SessionResult};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, ExponentialBackoff};
use crate::session::Session;

/// Event confirming the credentials were accepted.
pub const SUCCESSFUL_AUTH_EVENT: &str = "SuccessfulAuth";

/// Event confirming the PBX finished booting.
pub const FULLY_BOOTED_EVENT: &str = "FullyBooted";

/// Why a recovery was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryReason {
    EventLoopStopped,
    ConnectionLost,
}

impl RecoveryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryReason::EventLoopStopped => "event_loop_stopped",
            RecoveryReason::ConnectionLost => "connection_lost",
        }
    }
}

impl fmt::Display for RecoveryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    /// Both checks passed.
    Healthy,
    /// A check failed and the session was re-established.
    Recovered { reason: RecoveryReason },
    /// A check failed and every reconnect attempt of this round failed.
    Unavailable { reason: RecoveryReason },
    /// Reconnecting is suspended by the circuit breaker.
    Suspended,
}

impl HealthOutcome {
    /// Whether actions can be executed on the session.
    pub fn is_available(&self) -> bool {
        matches!(self, HealthOutcome::Healthy | HealthOutcome::Recovered { .. })
    }
}

/// Waits for the two login confirmations.
struct LoginWatcher {
    auth: Mutex<Option<oneshot::Sender<()>>>,
    booted: Mutex<Option<oneshot::Sender<()>>>,
}

impl LoginWatcher {
    fn new() -> (Self, oneshot::Receiver<()>, oneshot::Receiver<()>) {
        let (auth_tx, auth_rx) = oneshot::channel();
        let (booted_tx, booted_rx) = oneshot::channel();
        let watcher = Self {
            auth: Mutex::new(Some(auth_tx)),
            booted: Mutex::new(Some(booted_tx)),
        };
        (watcher, auth_rx, booted_rx)
    }
}

impl EventListener for LoginWatcher {
    fn on_event(&self, event: &Event) {
        let slot = match event.name() {
            SUCCESSFUL_AUTH_EVENT => &self.auth,
            FULLY_BOOTED_EVENT => &self.booted,
            _ => return,
        };
        if let Some(tx) = slot.lock().take() {
            let _ = tx.send(());
        }
    }
}

/// Validates login and keeps the session alive.
pub struct SessionHealthMonitor {
    session: Arc<Session>,
    credentials: Credentials,
    config: SessionConfig,
    breaker: CircuitBreaker,
    pending_recovery: Mutex<Option<RecoveryReason>>,
}

impl SessionHealthMonitor {
    pub fn new(session: Arc<Session>, credentials: Credentials, config: SessionConfig) -> Self {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::from(&config.reconnect));
        Self {
            session,
            credentials,
            config,
            breaker,
            pending_recovery: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Connect, log in and wait for `SuccessfulAuth` and `FullyBooted`.
    ///
    /// A rejected login or a missing confirmation is [`SessionError::Fatal`].
    #[instrument(skip(self), fields(username = %self.credentials.username))]
    pub async fn login(&self) -> SessionResult<()> {
        let connection = self.session.connection().clone();
        let (watcher, auth_rx, booted_rx) = LoginWatcher::new();

        self.session.attach_dispatcher();
        let watcher_id = connection.add_event_listener(Arc::new(watcher));

        let result = self.login_with(auth_rx, booted_rx).await;
        connection.remove_event_listener(watcher_id);

        if let Err(e) = &result {
            if e.is_fatal() {
                error!(error = %e, "Login failed");
            }
        }
        result
    }

    async fn login_with(
        &self,
        auth_rx: oneshot::Receiver<()>,
        booted_rx: oneshot::Receiver<()>,
    ) -> SessionResult<()> {
        let connection = self.session.connection();
        connection.connect().await?;

        match connection
            .login(&self.credentials.username, &self.credentials.secret)
            .await?
        {
            Some(response) if response.is_success() => {}
            Some(response) => {
                return Err(SessionError::Fatal(format!(
                    "login rejected: {}",
                    response.message().unwrap_or("no message")
                )));
            }
            None => {
                return Err(SessionError::ConnectionLost(format!(
                    "no login response after {}s",
                    connection.response_timeout().as_secs()
                )));
            }
        }

        let (auth, booted) = tokio::join!(
            tokio::time::timeout(self.config.login_timeout, auth_rx),
            tokio::time::timeout(self.config.boot_timeout, booted_rx),
        );
        if !matches!(auth, Ok(Ok(()))) {
            return Err(SessionError::Fatal(format!(
                "{} not received within {}s",
                SUCCESSFUL_AUTH_EVENT,
                self.config.login_timeout.as_secs()
            )));
        }
        if !matches!(booted, Ok(Ok(()))) {
            return Err(SessionError::Fatal(format!(
                "{} not received within {}s",
                FULLY_BOOTED_EVENT,
                self.config.boot_timeout.as_secs()
            )));
        }

        self.session.set_login_validated(true);
        self.session.dispatcher().touch();
        info!("Logged in to Asterisk manager");
        Ok(())
    }

    /// `false` only if login was validated and the event reader has stopped.
    pub fn check_event_thread_health(&self) -> bool {
        !self.session.is_login_validated() || self.session.connection().is_event_loop_alive()
    }

    /// Probe an idle session with `Ping`. A session that saw an event within
    /// the ping timeout is healthy without probing.
    pub async fn check_connection_health(&self) -> bool {
        let idle = self.session.dispatcher().idle_for();
        if idle <= self.config.ping_timeout {
            return true;
        }

        warn!(
            idle_secs = idle.as_secs(),
            "No event received within ping timeout, validating connection"
        );
        match self.session.ping().await {
            Ok(Some(_)) => {
                self.session.dispatcher().touch();
                true
            }
            Ok(None) => {
                warn!("Ping not answered");
                false
            }
            Err(e) => {
                warn!(error = %e, "Ping failed");
                false
            }
        }
    }

    /// Reason of an unfinished recovery, if the last round did not succeed.
    pub fn pending_recovery(&self) -> Option<RecoveryReason> {
        *self.pending_recovery.lock()
    }

    /// Run both checks and recover when one fails. A recovery that did not
    /// succeed is resumed before any check.
    pub async fn ensure_healthy(&self) -> SessionResult<HealthOutcome> {
        let pending = *self.pending_recovery.lock();
        let reason = if let Some(reason) = pending {
            warn!(reason = %reason, "Resuming unfinished session recovery");
            reason
        } else if !self.check_event_thread_health() {
            error!("Event reader ended unexpectedly, restarting connection");
            RecoveryReason::EventLoopStopped
        } else if !self.check_connection_health().await {
            error!("Connection to the manager lost, restarting connection");
            RecoveryReason::ConnectionLost
        } else {
            return Ok(HealthOutcome::Healthy);
        };

        self.recover(reason).await
    }

    /// Disconnect and log in again, retrying with backoff.
    ///
    /// Fatal login errors are returned; transport errors are retried up to
    /// `max_attempts` and then reported as [`HealthOutcome::Unavailable`].
    pub async fn recover(&self, reason: RecoveryReason) -> SessionResult<HealthOutcome> {
        *self.pending_recovery.lock() = Some(reason);
        if !self.breaker.allow_request() {
            warn!(reason = %reason, "Reconnect suspended by circuit breaker");
            return Ok(HealthOutcome::Suspended);
        }

        let max_attempts = self.config.reconnect.max_attempts.max(1);
        let mut backoff = ExponentialBackoff::from_config(&self.config.reconnect);

        for attempt in 1..=max_attempts {
            self.session.disconnect().await;

            match self.login().await {
                Ok(()) => {
                    self.breaker.record_success();
                    *self.pending_recovery.lock() = None;
                    info!(reason = %reason, attempt = attempt, "Session recovered");
                    return Ok(HealthOutcome::Recovered { reason });
                }
                Err(e) if e.is_fatal() => {
                    self.breaker.record_failure();
                    return Err(e);
                }
                Err(e) => {
                    warn!(attempt = attempt, max_attempts = max_attempts, error = %e, "Reconnect attempt failed");
                    if attempt < max_attempts {
                        tokio::time::sleep(backoff.next_delay()).await;
                    }
                }
            }
        }

        self.breaker.record_failure();
        error!(reason = %reason, "Session unavailable after {} attempts", max_attempts);
        Ok(HealthOutcome::Unavailable { reason })
    }
}
