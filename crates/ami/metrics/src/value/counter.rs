//! Monotonic counter accumulator.

use std::sync::OnceLock;

use ami_protocol::Event;
use prometheus::{Counter, CounterVec, Registry};
use tracing::warn;

use super::{label_refs, MetricValue};
use crate::descriptor::MetricDescriptor;
use crate::error::{MetricError, MetricResult};
use crate::expression::ValueExpr;

enum CounterHandle {
    Plain(Counter),
    Labeled(CounterVec),
}

/// Counter incremented by an evaluated expression on every matching event.
///
/// Updates commit immediately; scrape boundaries do not affect counters.
pub struct CounterValue {
    descriptor: MetricDescriptor,
    increment: ValueExpr,
    handle: OnceLock<CounterHandle>,
}

impl CounterValue {
    pub fn new(descriptor: MetricDescriptor, increment: ValueExpr) -> Self {
        Self {
            descriptor,
            increment,
            handle: OnceLock::new(),
        }
    }

    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    /// Current exposed value of a series.
    pub fn get(&self, label_values: &[&str]) -> MetricResult<f64> {
        match self.handle()? {
            CounterHandle::Plain(counter) => Ok(counter.get()),
            CounterHandle::Labeled(vec) => Ok(vec.get_metric_with_label_values(label_values)?.get()),
        }
    }

    fn handle(&self) -> MetricResult<&CounterHandle> {
        self.handle.get().ok_or_else(|| MetricError::Uninitialized {
            metric: self.descriptor.name().to_string(),
        })
    }
}

impl MetricValue for CounterValue {
    fn name(&self) -> &str {
        self.descriptor.name()
    }

    fn register(&self, registry: &Registry) -> MetricResult<()> {
        let already = || MetricError::AlreadyInitialized {
            metric: self.descriptor.name().to_string(),
        };
        if self.handle.get().is_some() {
            return Err(already());
        }

        let opts = self.descriptor.opts();
        let handle = if self.descriptor.has_labels() {
            let vec = CounterVec::new(opts, &self.descriptor.label_names())?;
            registry.register(Box::new(vec.clone()))?;
            CounterHandle::Labeled(vec)
        } else {
            let counter = Counter::with_opts(opts)?;
            registry.register(Box::new(counter.clone()))?;
            CounterHandle::Plain(counter)
        };

        self.handle.set(handle).map_err(|_| already())
    }

    fn on_scrape_start(&self) -> MetricResult<()> {
        self.handle().map(|_| ())
    }

    fn on_scrape_end(&self) -> MetricResult<()> {
        self.handle().map(|_| ())
    }

    fn process_event(&self, event: &Event) -> MetricResult<()> {
        let handle = self.handle()?;
        let amount = self.increment.evaluate_number(event);

        if amount.is_nan() || amount < 0.0 {
            warn!(
                metric = %self.descriptor.name(),
                amount = amount,
                "Ignoring counter increment that is not a non-negative number"
            );
            return Ok(());
        }

        match handle {
            CounterHandle::Plain(counter) => counter.inc_by(amount),
            CounterHandle::Labeled(vec) => {
                let values = self.descriptor.evaluate_labels(event);
                vec.get_metric_with_label_values(&label_refs(&values))?
                    .inc_by(amount);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(counter: CounterValue) -> CounterValue {
        counter.register(&Registry::new()).unwrap();
        counter
    }

    #[test]
    fn test_unregistered_counter() {
        let counter = CounterValue::new(
            MetricDescriptor::new("asterisk_calls_total", "Calls"),
            ValueExpr::literal("1"),
        );

        let result = counter.process_event(&Event::new("Newchannel"));
        assert!(matches!(result, Err(MetricError::Uninitialized { .. })));
    }

    #[test]
    fn test_double_registration() {
        let registry = Registry::new();
        let counter = CounterValue::new(
            MetricDescriptor::new("asterisk_calls_total", "Calls"),
            ValueExpr::literal("1"),
        );

        counter.register(&registry).unwrap();
        assert!(matches!(
            counter.register(&registry),
            Err(MetricError::AlreadyInitialized { .. })
        ));
    }

    #[test]
    fn test_sum_of_parsed_increments() {
        let counter = registered(CounterValue::new(
            MetricDescriptor::new("asterisk_billsec_total", "Billed seconds"),
            ValueExpr::parse("$BillableSeconds"),
        ));

        for raw in ["30", "12.5", "n/a", " 7 "] {
            let event = Event::new("Cdr").with_key("BillableSeconds", raw);
            counter.process_event(&event).unwrap();
        }

        assert_eq!(counter.get(&[]).unwrap(), 49.5);
    }

    #[test]
    fn test_missing_attribute_leaves_counter_unchanged() {
        let counter = registered(CounterValue::new(
            MetricDescriptor::new("asterisk_queue_calls_total", "Queue calls"),
            ValueExpr::parse("$Count"),
        ));

        counter.process_event(&Event::new("QueueParams")).unwrap();
        assert_eq!(counter.get(&[]).unwrap(), 0.0);
    }

    mod logging {
        use std::fmt;
        use std::sync::Arc;

        use parking_lot::Mutex;
        use tracing::field::{Field, Visit};
        use tracing::{Level, Subscriber};
        use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

        type Record = (Level, Vec<(String, String)>);

        /// Layer keeping every emitted event with its fields.
        #[derive(Clone, Default)]
        pub struct Captured(Arc<Mutex<Vec<Record>>>);

        struct Fields(Vec<(String, String)>);

        impl Visit for Fields {
            fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
                self.0.push((field.name().to_string(), format!("{:?}", value)));
            }

            fn record_str(&mut self, field: &Field, value: &str) {
                self.0.push((field.name().to_string(), value.to_string()));
            }
        }

        impl<S: Subscriber> Layer<S> for Captured {
            fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
                let mut fields = Fields(Vec::new());
                event.record(&mut fields);
                self.0.lock().push((*event.metadata().level(), fields.0));
            }
        }

        impl Captured {
            pub fn capture<R>(&self, f: impl FnOnce() -> R) -> R {
                let subscriber = tracing_subscriber::registry().with(self.clone());
                tracing::subscriber::with_default(subscriber, f)
            }

            /// Errors carrying `key = value`.
            pub fn errors_with(&self, key: &str, value: &str) -> usize {
                self.0
                    .lock()
                    .iter()
                    .filter(|(level, fields)| {
                        *level == Level::ERROR
                            && fields.iter().any(|(k, v)| k == key && v == value)
                    })
                    .count()
            }

            pub fn messages(&self) -> Vec<String> {
                self.0
                    .lock()
                    .iter()
                    .flat_map(|(_, fields)| fields.iter())
                    .filter(|(k, _)| k == "message")
                    .map(|(_, v)| v.clone())
                    .collect()
            }
        }
    }

    #[test]
    fn test_missing_attribute_is_logged() {
        let counter = registered(CounterValue::new(
            MetricDescriptor::new("asterisk_queue_calls_total", "Queue calls"),
            ValueExpr::parse("$Count"),
        ));
        let logs = logging::Captured::default();

        logs.capture(|| counter.process_event(&Event::new("QueueParams")))
            .unwrap();

        assert_eq!(counter.get(&[]).unwrap(), 0.0);
        assert_eq!(logs.errors_with("attribute", "Count"), 1);
        assert_eq!(logs.errors_with("event", "QueueParams"), 1);
        assert!(logs
            .messages()
            .iter()
            .any(|m| m == "Event attribute not found"));
    }

    #[test]
    fn test_labeled_series() {
        let counter = registered(CounterValue::new(
            MetricDescriptor::new("asterisk_hangups_total", "Hangups").with_label("cause", "$Cause"),
            ValueExpr::literal("1"),
        ));

        for cause in ["16", "16", "17"] {
            counter
                .process_event(&Event::new("Hangup").with_key("Cause", cause))
                .unwrap();
        }

        assert_eq!(counter.get(&["16"]).unwrap(), 2.0);
        assert_eq!(counter.get(&["17"]).unwrap(), 1.0);
    }

    #[test]
    fn test_negative_increment_ignored() {
        let counter = registered(CounterValue::new(
            MetricDescriptor::new("asterisk_delta_total", "Delta"),
            ValueExpr::parse("$Delta"),
        ));

        counter
            .process_event(&Event::new("Delta").with_key("Delta", "5"))
            .unwrap();
        counter
            .process_event(&Event::new("Delta").with_key("Delta", "-3"))
            .unwrap();

        assert_eq!(counter.get(&[]).unwrap(), 5.0);
    }
}
