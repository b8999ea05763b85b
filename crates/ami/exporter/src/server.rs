//! Metrics HTTP server and shutdown signalling

use std::net::SocketAddr;
use std::sync::Arc;

use ami_metrics::exporter::http::metrics_router;
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::{ExporterError, ExporterResult};

/// Serves `GET /metrics` until shutdown
pub struct MetricsServer {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl MetricsServer {
    /// Bind the listen address
    pub async fn bind(addr: SocketAddr, registry: Arc<Registry>) -> ExporterResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, registry })
    }

    pub fn local_addr(&self) -> ExporterResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server with graceful shutdown once `shutdown` flips to `true`
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> ExporterResult<()> {
        let addr = self.local_addr()?;
        info!("Started metrics server on {}", addr);

        let app = metrics_router(self.registry);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
            .map_err(|e| ExporterError::Server(e.to_string()))?;

        info!("Metrics server stopped");
        Ok(())
    }
}

/// Flip `shutdown` on Ctrl+C or SIGTERM
pub async fn shutdown_signal(shutdown: Arc<watch::Sender<bool>>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    let _ = shutdown.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::IntGauge;

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let registry = Arc::new(Registry::new());
        let gauge = IntGauge::new("asterisk_up", "Whether the manager answers").unwrap();
        registry.register(Box::new(gauge.clone())).unwrap();
        gauge.set(1);

        let server = MetricsServer::bind("127.0.0.1:0".parse().unwrap(), registry)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(server.run(rx));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut body = String::new();
        stream.read_to_string(&mut body).await.unwrap();
        assert!(body.starts_with("HTTP/1.1 200"));
        assert!(body.contains("asterisk_up 1"));

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
