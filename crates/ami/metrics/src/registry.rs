//! Central metrics registry for the exporter

use prometheus::Registry;
use std::sync::Arc;

use crate::error::MetricResult;
use crate::exporter::export_metrics;

/// Shared registry holding configured metrics and exporter self-telemetry
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
}

impl MetricsRegistry {
    /// Create a registry without a name prefix
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new()),
        }
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> MetricResult<String> {
        export_metrics(&self.registry)
    }

    /// Get the underlying registry for custom metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Shared handle for the HTTP endpoint
    pub fn shared(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
