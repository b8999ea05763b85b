//! Metrics exporter for Prometheus scraping

use prometheus::{Encoder, Registry, TextEncoder};

use crate::error::{MetricError, MetricResult};

/// Export metrics in Prometheus text format
pub fn export_metrics(registry: &Registry) -> MetricResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| MetricError::Encoding(e.to_string()))
}

/// HTTP handler for metrics endpoint (requires "http" feature)
#[cfg(feature = "http")]
pub mod http {
    use axum::{
        extract::State,
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use prometheus::Registry;
    use std::sync::Arc;
    use tracing::error;

    /// Metrics endpoint state
    #[derive(Clone)]
    pub struct MetricsState {
        pub registry: Arc<Registry>,
    }

    impl MetricsState {
        pub fn new(registry: Arc<Registry>) -> Self {
            Self { registry }
        }
    }

    /// Handler for GET /metrics
    pub async fn metrics_handler(State(state): State<MetricsState>) -> Response {
        match super::export_metrics(&state.registry) {
            Ok(metrics) => (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                metrics,
            )
                .into_response(),
            Err(e) => {
                error!(error = %e, "Failed to render metrics");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }

    /// Create an axum router for metrics
    pub fn metrics_router(registry: Arc<Registry>) -> axum::Router {
        use axum::routing::get;

        axum::Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(MetricsState::new(registry))
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use axum::body::Body;
        use axum::http::Request;
        use prometheus::IntGauge;
        use tower::ServiceExt;

        #[tokio::test]
        async fn test_metrics_route() {
            let registry = Arc::new(Registry::new());
            let gauge = IntGauge::new("asterisk_up", "Whether the AMI session is up").unwrap();
            registry.register(Box::new(gauge.clone())).unwrap();
            gauge.set(1);

            let response = metrics_router(registry)
                .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()["content-type"],
                "text/plain; version=0.0.4; charset=utf-8"
            );
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            assert!(String::from_utf8_lossy(&body).contains("asterisk_up 1"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::IntCounter;

    #[test]
    fn test_export_metrics() {
        let registry = Registry::new();
        let counter = IntCounter::new("test_counter", "A test counter").unwrap();
        registry.register(Box::new(counter.clone())).unwrap();
        counter.inc();

        let output = export_metrics(&registry).unwrap();
        assert!(output.contains("test_counter 1"));
    }
}
