//! Session health and reconnect configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Login credentials for the manager interface.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"***")
            .finish()
    }
}

/// Timeouts governing login validation and idle probing.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wait for `SuccessfulAuth` after login.
    pub login_timeout: Duration,

    /// Wait for `FullyBooted` after login.
    pub boot_timeout: Duration,

    /// Idle time after which the connection is probed with `Ping`.
    pub ping_timeout: Duration,

    /// Reconnect policy.
    pub reconnect: ReconnectConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_timeout: Duration::from_secs(10),
            boot_timeout: Duration::from_secs(60),
            ping_timeout: Duration::from_secs(120),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Reconnect policy: bounded exponential backoff plus a circuit breaker
/// over whole recovery rounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Login attempts per recovery round.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_backoff_ms: u64,

    /// Upper bound for any delay.
    pub max_backoff_ms: u64,

    /// Growth factor between attempts.
    pub multiplier: f64,

    /// Failed rounds before reconnecting is suspended.
    pub failure_threshold: u32,

    /// Suspension length in seconds before one round is let through.
    pub reset_timeout: u64,
}

impl ReconnectConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
            failure_threshold: 5,
            reset_timeout: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let credentials = Credentials::new("exporter", "hunter2");
        let rendered = format!("{:?}", credentials);
        assert!(rendered.contains("exporter"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_reconnect_defaults() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_backoff(), Duration::from_millis(500));
        assert_eq!(config.reset_timeout(), Duration::from_secs(60));
    }
}
