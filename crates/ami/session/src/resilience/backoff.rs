//! Exponential backoff between reconnect attempts.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Delay schedule `initial * multiplier^n`, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            max,
            // never shrink
            multiplier: multiplier.max(1.0),
            attempt: 0,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(config.initial_backoff(), config.max_backoff(), config.multiplier)
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let factor = self.multiplier.powi(self.attempt.min(i32::MAX as u32) as i32);
        let millis = (self.initial.as_millis() as f64 * factor).min(self.max.as_millis() as f64);
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(millis as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_and_cap() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(3), 2.0);

        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(3000),
                Duration::from_millis(3000),
            ]
        );
    }

    #[test]
    fn test_from_config() {
        let config = ReconnectConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 250,
            multiplier: 3.0,
            ..ReconnectConfig::default()
        };
        let mut backoff = ExponentialBackoff::from_config(&config);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_multiplier_below_one_is_constant() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(200), Duration::from_secs(1), 0.5);
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
    }
}
