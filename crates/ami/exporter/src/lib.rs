//! AMI Exporter library
//!
//! This module provides the core components of the exporter daemon:
//! - Configuration loading, validation and plan building
//! - Action execution with correlated terminal events
//! - The scrape loop driving health checks and actions
//! - Self-telemetry and the metrics HTTP server

pub mod action;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod server;
pub mod telemetry;

pub use action::{Action, ActionDefaults};
pub use config::{ConfigError, ExporterConfig, ScrapePlan};
pub use coordinator::{CycleReport, ScrapeCoordinator};
pub use error::{ExporterError, ExporterResult};
pub use executor::{ActionError, ActionExecutor, ExecutorState};
pub use server::{shutdown_signal, MetricsServer};
pub use telemetry::ExporterMetrics;
