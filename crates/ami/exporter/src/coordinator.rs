//! The periodic scrape loop.
//!
//! Each cycle checks session health, then runs every configured action in
//! order, then sleeps for the scrape interval. Shutdown is observed during
//! the health check, between actions and during the sleep, never in the
//! middle of an action.

use std::sync::Arc;
use std::time::Duration;

use ami_session::{HealthOutcome, SessionHealthMonitor, SessionResult};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::executor::ActionExecutor;
use crate::telemetry::ExporterMetrics;

/// Summary of one scrape cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// `None` when shutdown interrupted the health check.
    pub health: Option<HealthOutcome>,
    pub executed: usize,
    pub failed: usize,
    pub interrupted: bool,
}

/// Drives health checks and action execution.
pub struct ScrapeCoordinator {
    monitor: Arc<SessionHealthMonitor>,
    executor: ActionExecutor,
    actions: Vec<Action>,
    interval: Duration,
    telemetry: Option<ExporterMetrics>,
}

impl ScrapeCoordinator {
    pub fn new(monitor: Arc<SessionHealthMonitor>, actions: Vec<Action>, interval: Duration) -> Self {
        let executor = ActionExecutor::new(monitor.session().clone());
        Self {
            monitor,
            executor,
            actions,
            interval,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: ExporterMetrics) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one cycle. Only a fatal session error is returned.
    pub async fn run_cycle(&mut self, shutdown: &watch::Receiver<bool>) -> SessionResult<CycleReport> {
        let started = Instant::now();
        debug!("Starting scrape process");

        let mut report = CycleReport {
            health: None,
            executed: 0,
            failed: 0,
            interrupted: false,
        };

        // A recovery round may span several login timeouts.
        let mut stop = shutdown.clone();
        let health = tokio::select! {
            biased;
            _ = stop.wait_for(|stop| *stop) => {
                info!("Shutdown requested during session health check");
                report.interrupted = true;
                return Ok(report);
            }
            health = self.monitor.ensure_healthy() => health?,
        };
        report.health = Some(health);

        if let Some(telemetry) = &self.telemetry {
            if let HealthOutcome::Recovered { reason } = health {
                telemetry.record_reconnect(reason);
            }
            telemetry.set_session_up(health.is_available());
            telemetry.set_reconnect_circuit(self.monitor.breaker().state());
        }

        if !health.is_available() {
            warn!(health = ?health, "Session unavailable, skipping actions");
            return Ok(report);
        }

        for action in &self.actions {
            if *shutdown.borrow() {
                report.interrupted = true;
                break;
            }

            let action_started = Instant::now();
            let outcome = match self.executor.exec(action).await {
                Ok(()) => "success",
                Err(e) => {
                    report.failed += 1;
                    e.outcome()
                }
            };
            report.executed += 1;

            if let Some(telemetry) = &self.telemetry {
                telemetry.record_action(&action.name, outcome, action_started.elapsed());
            }
        }

        if let Some(telemetry) = &self.telemetry {
            telemetry.record_scrape(started.elapsed());
        }
        debug!(
            executed = report.executed,
            failed = report.failed,
            "Finished scrape process"
        );
        Ok(report)
    }

    /// Loop until `shutdown` flips to `true`, then log off.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SessionResult<()> {
        info!(
            actions = self.actions.len(),
            interval_secs = self.interval.as_secs(),
            "Scrape loop started"
        );

        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            match self.run_cycle(&shutdown).await {
                Ok(report) if report.interrupted => break Ok(()),
                Ok(_) => {}
                Err(e) => break Err(e),
            }

            debug!("Next scrape in: {}s", self.interval.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                }
            }
        };

        info!("Scrape loop stopped, logging off");
        self.monitor.session().logoff().await;
        result
    }
}
