//! # AMI Metrics - Event-to-metric translation
//!
//! Folds AMI event attributes into Prometheus counters and gauges.
//!
//! ## Key Components
//!
//! - [`ValueExpr`]: literal or `$Attribute` expression evaluated per event
//! - [`MetricValue`]: accumulator trait, implemented by [`CounterValue`] and
//!   [`GaugeValue`]
//! - [`EventFilter`]: name/correlation matcher fanning events out to metrics
//! - [`MetricsRegistry`]: registry shared with the HTTP exposition endpoint
//!
//! ## Scrape boundaries
//!
//! Gauges buffer updates between `on_scrape_start` and `on_scrape_end` so a
//! scrape never observes a half-collected action result. Counters commit
//! every increment immediately.
//!
//! ## Example
//!
//! ```rust
//! use ami_metrics::{EventFilter, GaugeValue, MetricDescriptor, MetricValue, MetricsRegistry, ValueExpr};
//! use ami_protocol::Event;
//!
//! let registry = MetricsRegistry::new();
//! let gauge = GaugeValue::new(
//!     MetricDescriptor::new("asterisk_channel_duration_seconds", "Channel duration")
//!         .with_label("channel", "$Channel"),
//! )
//! .with_set_value(ValueExpr::parse("$Duration"));
//!
//! let filter = EventFilter::from_pattern("CoreShowChannel", vec![Box::new(gauge)]);
//! filter.register(registry.registry()).unwrap();
//!
//! filter.process_event(
//!     &Event::new("CoreShowChannel")
//!         .with_key("Channel", "SIP/100")
//!         .with_key("Duration", "12"),
//! );
//! assert!(registry.export().unwrap().contains("channel=\"SIP/100\"} 12"));
//! ```

pub mod descriptor;
pub mod error;
pub mod exporter;
pub mod expression;
pub mod filter;
pub mod registry;
pub mod value;

pub use descriptor::{LabelExpr, MetricDescriptor};
pub use error::{MetricError, MetricResult};
pub use exporter::export_metrics;
pub use expression::{parse_number, ValueExpr};
pub use filter::{split_event_names, EventFilter};
pub use registry::MetricsRegistry;
pub use value::{CounterValue, GaugeValue, MetricValue};
