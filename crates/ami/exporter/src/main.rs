//! AMI Exporter Daemon
//!
//! Logs in to the Asterisk manager interface, runs the configured actions
//! every scrape interval and serves the collected metrics on `/metrics`.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use ami_exporter::config::normalize_log_level;
use ami_exporter::{
    shutdown_signal, ExporterConfig, ExporterError, ExporterMetrics, ExporterResult,
    MetricsServer, ScrapeCoordinator,
};
use ami_metrics::MetricsRegistry;
use ami_protocol::AmiClient;
use ami_session::{Session, SessionHealthMonitor};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// AMI Exporter CLI
#[derive(Parser)]
#[command(name = "ami-exporterd")]
#[command(about = "Asterisk Manager Interface exporter for Prometheus", long_about = None)]
#[command(version)]
struct Cli {
    /// Port the metrics are exposed on
    #[arg(default_value_t = 8080)]
    port: u16,

    /// Configuration file path
    #[arg(short, long, env = "AMI_EXPORTER_CONFIG", default_value = "config.yml")]
    config: String,

    /// Address the metrics server binds to
    #[arg(short, long, env = "AMI_EXPORTER_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Log level; overrides `general.log_level`
    #[arg(long, env = "AMI_EXPORTER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "AMI_EXPORTER_LOG_JSON")]
    json: bool,
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> ExporterResult<()> {
    let cli = Cli::parse();

    // Load configuration before logging is up; report failures on stderr
    let config = match ExporterConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Unable to load configuration file '{}': {}", cli.config, e);
            return Err(e.into());
        }
    };

    let level = cli
        .log_level
        .as_deref()
        .map(normalize_log_level)
        .unwrap_or_else(|| config.log_level());
    init_tracing(&level, cli.json);
    info!("Loaded configuration file: '{}'", cli.config);

    let result = run(cli, config).await;
    if let Err(e) = &result {
        error!(error = %e, "Exporter stopped");
    }
    result
}

async fn run(cli: Cli, config: ExporterConfig) -> ExporterResult<()> {
    let registry = MetricsRegistry::new();
    let telemetry = ExporterMetrics::new(registry.registry())?;
    let plan = config.build(&registry)?;
    info!(
        standing_filters = plan.standing_filters.len(),
        actions = plan.actions.len(),
        "Registered configured metrics"
    );

    let client = Arc::new(AmiClient::new(config.client_config()));
    let session = Arc::new(Session::new(client));

    // Standing filters see every event the manager sends, with or without
    // a preceding action, until the exporter stops.
    session.attach_standing_filters(plan.standing_filters);

    let monitor = Arc::new(SessionHealthMonitor::new(
        session,
        config.credentials(),
        config.session_config(),
    ));
    monitor.login().await?;
    telemetry.set_session_up(true);

    let server = MetricsServer::bind(SocketAddr::new(cli.bind, cli.port), registry.shared()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let server_handle = tokio::spawn(server.run(shutdown_rx.clone()));
    tokio::spawn(shutdown_signal(shutdown_tx.clone()));

    let coordinator = ScrapeCoordinator::new(monitor, plan.actions, plan.interval)
        .with_telemetry(telemetry);
    let scrape_result = coordinator.run(shutdown_rx).await;

    let _ = shutdown_tx.send(true);
    let server_result = server_handle
        .await
        .map_err(|e| ExporterError::Server(e.to_string()))?;

    scrape_result?;
    server_result
}
