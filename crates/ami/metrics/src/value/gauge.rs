//! Gauge accumulator with scrape-scoped buffering.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use ami_protocol::Event;
use parking_lot::Mutex;
use prometheus::{Gauge, GaugeVec, Registry};

use super::{label_refs, MetricValue};
use crate::descriptor::MetricDescriptor;
use crate::error::{MetricError, MetricResult};
use crate::expression::ValueExpr;

enum GaugeHandle {
    Plain(Gauge),
    Labeled(GaugeVec),
}

#[derive(Debug, Default)]
struct GaugeState {
    value: f64,
    series: BTreeMap<Vec<String>, f64>,
    scrape_in_progress: bool,
}

/// Gauge driven by an optional set-expression and an optional increment.
///
/// While a scrape is in progress, updates only touch the in-memory buffer
/// and are pushed to the exposed gauge by `on_scrape_end`. Outside a scrape
/// every update is pushed immediately.
pub struct GaugeValue {
    descriptor: MetricDescriptor,
    set_value: Option<ValueExpr>,
    increment: Option<ValueExpr>,
    value_on_scrape_start: Option<f64>,
    handle: OnceLock<GaugeHandle>,
    state: Mutex<GaugeState>,
}

impl GaugeValue {
    pub fn new(descriptor: MetricDescriptor) -> Self {
        Self {
            descriptor,
            set_value: None,
            increment: None,
            value_on_scrape_start: None,
            handle: OnceLock::new(),
            state: Mutex::new(GaugeState::default()),
        }
    }

    pub fn with_set_value(mut self, expr: ValueExpr) -> Self {
        self.set_value = Some(expr);
        self
    }

    pub fn with_increment(mut self, expr: ValueExpr) -> Self {
        self.increment = Some(expr);
        self
    }

    /// Reset every known series to `value` when a scrape starts.
    pub fn with_value_on_scrape_start(mut self, value: f64) -> Self {
        self.value_on_scrape_start = Some(value);
        self
    }

    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    pub fn is_scrape_in_progress(&self) -> bool {
        self.state.lock().scrape_in_progress
    }

    /// Buffered (not necessarily exposed) value of a series.
    pub fn buffered(&self, label_values: &[&str]) -> Option<f64> {
        let state = self.state.lock();
        if !self.descriptor.has_labels() {
            return Some(state.value);
        }
        let key: Vec<String> = label_values.iter().map(|v| v.to_string()).collect();
        state.series.get(&key).copied()
    }

    /// Currently exposed value of a series.
    pub fn exposed(&self, label_values: &[&str]) -> MetricResult<f64> {
        match self.handle()? {
            GaugeHandle::Plain(gauge) => Ok(gauge.get()),
            GaugeHandle::Labeled(vec) => Ok(vec.get_metric_with_label_values(label_values)?.get()),
        }
    }

    fn handle(&self) -> MetricResult<&GaugeHandle> {
        self.handle.get().ok_or_else(|| MetricError::Uninitialized {
            metric: self.descriptor.name().to_string(),
        })
    }

    fn apply(&self, current: f64, event: &Event) -> f64 {
        let mut value = current;
        if let Some(set) = &self.set_value {
            value = set.evaluate_number(event);
        }
        if let Some(increment) = &self.increment {
            value += increment.evaluate_number(event);
        }
        value
    }
}

fn commit_series(vec: &GaugeVec, key: &[String], value: f64) -> MetricResult<()> {
    vec.get_metric_with_label_values(&label_refs(key))?.set(value);
    Ok(())
}

impl MetricValue for GaugeValue {
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
            let vec = GaugeVec::new(opts, &self.descriptor.label_names())?;
            registry.register(Box::new(vec.clone()))?;
            GaugeHandle::Labeled(vec)
        } else {
            let gauge = Gauge::with_opts(opts)?;
            registry.register(Box::new(gauge.clone()))?;
            GaugeHandle::Plain(gauge)
        };

        self.handle.set(handle).map_err(|_| already())
    }

    fn on_scrape_start(&self) -> MetricResult<()> {
        let handle = self.handle()?;
        let mut state = self.state.lock();

        if let Some(reset) = self.value_on_scrape_start {
            match handle {
                GaugeHandle::Plain(_) => state.value = reset,
                GaugeHandle::Labeled(_) => state.series.values_mut().for_each(|v| *v = reset),
            }
        }
        state.scrape_in_progress = true;
        Ok(())
    }

    fn on_scrape_end(&self) -> MetricResult<()> {
        let handle = self.handle()?;
        let mut state = self.state.lock();

        match handle {
            GaugeHandle::Plain(gauge) => gauge.set(state.value),
            GaugeHandle::Labeled(vec) => {
                for (key, value) in &state.series {
                    commit_series(vec, key, *value)?;
                }
            }
        }
        state.scrape_in_progress = false;
        Ok(())
    }

    fn process_event(&self, event: &Event) -> MetricResult<()> {
        let handle = self.handle()?;
        let mut state = self.state.lock();
        let live = !state.scrape_in_progress;

        match handle {
            GaugeHandle::Plain(gauge) => {
                state.value = self.apply(state.value, event);
                if live {
                    gauge.set(state.value);
                }
            }
            GaugeHandle::Labeled(vec) => {
                let key = self.descriptor.evaluate_labels(event);
                let entry = state.series.entry(key.clone()).or_insert(0.0);
                *entry = self.apply(*entry, event);
                let value = *entry;
                if live {
                    commit_series(vec, &key, value)?;
                }
            }
        }
        Ok(())
    }
}
