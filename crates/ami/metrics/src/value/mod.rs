//! Typed accumulators folding event attributes into exposed metrics.

mod counter;
mod gauge;

pub use counter::CounterValue;
pub use gauge::GaugeValue;

use std::sync::Arc;

use ami_protocol::Event;
use prometheus::Registry;

use crate::error::MetricResult;

/// An accumulator over one exposed metric.
///
/// `register` must succeed before any other operation; until then every
/// hook returns [`MetricError::Uninitialized`](crate::MetricError::Uninitialized).
pub trait MetricValue: Send + Sync {
    /// Exposed metric name.
    fn name(&self) -> &str;

    /// Create the backing collector and register it.
    fn register(&self, registry: &Registry) -> MetricResult<()>;

    /// Called when the owning action starts a scrape.
    fn on_scrape_start(&self) -> MetricResult<()>;

    /// Called when the owning action finishes a scrape. Idempotent.
    fn on_scrape_end(&self) -> MetricResult<()>;

    /// Fold one event into the accumulated state.
    fn process_event(&self, event: &Event) -> MetricResult<()>;
}

impl<T: MetricValue + ?Sized> MetricValue for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn register(&self, registry: &Registry) -> MetricResult<()> {
        (**self).register(registry)
    }

    fn on_scrape_start(&self) -> MetricResult<()> {
        (**self).on_scrape_start()
    }

    fn on_scrape_end(&self) -> MetricResult<()> {
        (**self).on_scrape_end()
    }

    fn process_event(&self, event: &Event) -> MetricResult<()> {
        (**self).process_event(event)
    }
}

pub(crate) fn label_refs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}
