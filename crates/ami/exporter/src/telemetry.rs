//! Exporter self-telemetry

use std::time::Duration;

use ami_metrics::MetricResult;
use ami_session::resilience::CircuitState;
use ami_session::RecoveryReason;
use prometheus::{Gauge, GaugeVec, IntCounterVec, IntGauge, Opts, Registry};

const NAMESPACE: &str = "ami_exporter";

/// Metrics describing the exporter itself
#[derive(Clone)]
pub struct ExporterMetrics {
    /// Action runs by outcome
    pub action_runs_total: IntCounterVec,

    /// Duration of the last run of each action
    pub action_duration_seconds: GaugeVec,

    /// Session re-establishments by trigger
    pub reconnects_total: IntCounterVec,

    /// Duration of the last scrape cycle
    pub scrape_duration_seconds: Gauge,

    /// Whether the session can execute actions (1) or not (0)
    pub session_up: IntGauge,

    /// Reconnect breaker: 0 closed, 1 open, 2 half-open
    pub reconnect_circuit_state: IntGauge,
}

impl ExporterMetrics {
    /// Create and register exporter metrics
    pub fn new(registry: &Registry) -> MetricResult<Self> {
        let action_runs_total = IntCounterVec::new(
            Opts::new("action_runs_total", "Total action executions").namespace(NAMESPACE),
            &["action", "outcome"],
        )?;
        registry.register(Box::new(action_runs_total.clone()))?;

        let action_duration_seconds = GaugeVec::new(
            Opts::new(
                "action_duration_seconds",
                "Duration of the last execution of an action",
            )
            .namespace(NAMESPACE),
            &["action"],
        )?;
        registry.register(Box::new(action_duration_seconds.clone()))?;

        let reconnects_total = IntCounterVec::new(
            Opts::new("reconnects_total", "Total session re-establishments").namespace(NAMESPACE),
            &["reason"],
        )?;
        registry.register(Box::new(reconnects_total.clone()))?;

        let scrape_duration_seconds = Gauge::with_opts(
            Opts::new(
                "scrape_duration_seconds",
                "Duration of the last scrape cycle",
            )
            .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(scrape_duration_seconds.clone()))?;

        let session_up = IntGauge::with_opts(
            Opts::new("session_up", "Whether the manager session is usable").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(session_up.clone()))?;

        let reconnect_circuit_state = IntGauge::with_opts(
            Opts::new(
                "reconnect_circuit_state",
                "Reconnect circuit breaker state (0 closed, 1 open, 2 half-open)",
            )
            .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(reconnect_circuit_state.clone()))?;

        Ok(Self {
            action_runs_total,
            action_duration_seconds,
            reconnects_total,
            scrape_duration_seconds,
            session_up,
            reconnect_circuit_state,
        })
    }

    /// Record one action run
    pub fn record_action(&self, action: &str, outcome: &str, duration: Duration) {
        self.action_runs_total
            .with_label_values(&[action, outcome])
            .inc();
        self.action_duration_seconds
            .with_label_values(&[action])
            .set(duration.as_secs_f64());
    }

    /// Record a session re-establishment
    pub fn record_reconnect(&self, reason: RecoveryReason) {
        self.reconnects_total
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    /// Record a completed scrape cycle
    pub fn record_scrape(&self, duration: Duration) {
        self.scrape_duration_seconds.set(duration.as_secs_f64());
    }

    /// Update the session availability gauge
    pub fn set_session_up(&self, up: bool) {
        self.session_up.set(i64::from(up));
    }

    /// Update the reconnect breaker gauge
    pub fn set_reconnect_circuit(&self, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        };
        self.reconnect_circuit_state.set(value);
    }
}
