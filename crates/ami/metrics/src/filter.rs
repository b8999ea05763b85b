//! Event filters fanning matching events out to metric values.

use ami_protocol::Event;
use parking_lot::RwLock;
use prometheus::Registry;
use tracing::{debug, error};

use crate::error::MetricResult;
use crate::value::MetricValue;

/// Separator between alternative event names in a filter pattern.
pub const EVENT_NAME_SEPARATOR: char = '|';

/// Matches events by name and, while attached to a running action, by
/// correlation id.
///
/// A filter without a correlation id is a standing filter and matches any
/// event with a matching name.
pub struct EventFilter {
    event_names: Vec<String>,
    metrics: Vec<Box<dyn MetricValue>>,
    correlation_id: RwLock<Option<String>>,
}

impl EventFilter {
    pub fn new<I, S>(event_names: I, metrics: Vec<Box<dyn MetricValue>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            event_names: event_names.into_iter().map(Into::into).collect(),
            metrics,
            correlation_id: RwLock::new(None),
        }
    }

    /// Build from a `Name|OtherName` pattern.
    pub fn from_pattern(pattern: &str, metrics: Vec<Box<dyn MetricValue>>) -> Self {
        Self::new(split_event_names(pattern), metrics)
    }

    pub fn event_names(&self) -> &[String] {
        &self.event_names
    }

    pub fn metrics(&self) -> &[Box<dyn MetricValue>] {
        &self.metrics
    }

    pub fn correlation_id(&self) -> Option<String> {
        self.correlation_id.read().clone()
    }

    /// Register every owned metric.
    pub fn register(&self, registry: &Registry) -> MetricResult<()> {
        for metric in &self.metrics {
            metric.register(registry)?;
        }
        Ok(())
    }

    /// Scope the filter to `correlation_id` and open a scrape on every metric.
    pub fn on_scrape_start(&self, correlation_id: &str) {
        *self.correlation_id.write() = Some(correlation_id.to_string());
        for metric in &self.metrics {
            if let Err(e) = metric.on_scrape_start() {
                error!(metric = metric.name(), error = %e, "Failed to start scrape");
            }
        }
    }

    /// Close the scrape on every metric. The correlation id stays set.
    pub fn on_scrape_end(&self) {
        for metric in &self.metrics {
            if let Err(e) = metric.on_scrape_end() {
                error!(metric = metric.name(), error = %e, "Failed to end scrape");
            }
        }
    }

    /// Clear the correlation id after the filter was detached.
    pub fn on_detach(&self) {
        *self.correlation_id.write() = None;
    }

    pub fn matches(&self, event: &Event) -> bool {
        if !self.event_names.iter().any(|name| name == event.name()) {
            return false;
        }
        match self.correlation_id.read().as_deref() {
            Some(expected) => event.action_id() == Some(expected),
            None => true,
        }
    }

    pub fn process_event(&self, event: &Event) {
        if !self.matches(event) {
            return;
        }

        debug!(event = event.name(), metrics = self.metrics.len(), "Processing event");
        for metric in &self.metrics {
            if let Err(e) = metric.process_event(event) {
                error!(
                    metric = metric.name(),
                    event = event.name(),
                    error = %e,
                    "Failed to process event"
                );
            }
        }
    }
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFilter")
            .field("event_names", &self.event_names)
            .field(
                "metrics",
                &self.metrics.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("correlation_id", &*self.correlation_id.read())
            .finish()
    }
}

/// Split a `Name|OtherName` pattern, dropping surrounding whitespace.
pub fn split_event_names(pattern: &str) -> Vec<String> {
    pattern
        .split(EVENT_NAME_SEPARATOR)
        .map(|name| name.trim().to_string())
        .collect()
}
