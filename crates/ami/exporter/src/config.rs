//! Configuration for ami-exporterd
//!
//! Loaded once from a YAML file (plus `AMI_EXPORTER__*` environment
//! overrides), validated, and then turned into registered filters and
//! actions. Nothing here is mutated after startup.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ami_metrics::{
    split_event_names, CounterValue, EventFilter, GaugeValue, MetricDescriptor, MetricError,
    MetricValue, MetricsRegistry, ValueExpr,
};
use ami_protocol::ClientConfig;
use ami_session::{Credentials, ReconnectConfig, SessionConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::action::{Action, ActionDefaults};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "AMI_EXPORTER";

/// Separator between nested keys in environment overrides
pub const ENV_SEPARATOR: &str = "__";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to register metric: {0}")]
    Metric(#[from] MetricError),
}

/// Main exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Manager connection and credentials
    pub ami_client: AmiClientConfig,

    /// Logging and session timeouts
    #[serde(default)]
    pub general: GeneralConfig,

    /// Defaults for actions that omit a setting
    #[serde(default)]
    pub default: DefaultConfig,

    /// Standing filters, active for the life of the session
    #[serde(default)]
    pub filter: Vec<FilterConfig>,

    /// Actions executed every scrape
    #[serde(default)]
    pub scrape: ScrapeConfig,
}

/// Manager connection configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct AmiClientConfig {
    /// Manager host
    #[serde(alias = "host")]
    pub ip: String,

    /// Manager port
    #[serde(default = "default_ami_port")]
    pub port: u16,

    pub username: String,

    pub secret: String,
}

impl std::fmt::Debug for AmiClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiClientConfig")
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"***")
            .finish()
    }
}

/// General configuration; timeouts are in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_login_validation_timeout")]
    pub login_validation_timeout: u64,

    #[serde(default = "default_fully_booted_validation_timeout")]
    pub fully_booted_validation_timeout: u64,

    #[serde(default = "default_response_timeout")]
    pub response_timeout: u64,

    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            login_validation_timeout: default_login_validation_timeout(),
            fully_booted_validation_timeout: default_fully_booted_validation_timeout(),
            response_timeout: default_response_timeout(),
            ping_timeout: default_ping_timeout(),
            connect_timeout: default_connect_timeout(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Action defaults; timeouts are in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultConfig {
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval: u64,

    #[serde(default = "default_action_response_timeout")]
    pub action_response_timeout: u64,

    #[serde(default = "default_action_event_timeout")]
    pub action_event_timeout: u64,

    #[serde(default = "default_action_priority")]
    pub action_priority: u32,

    #[serde(default = "default_action_context")]
    pub action_context: String,

    #[serde(default = "default_action_caller_id")]
    pub action_caller_id: String,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            scrape_interval: default_scrape_interval(),
            action_response_timeout: default_action_response_timeout(),
            action_event_timeout: default_action_event_timeout(),
            action_priority: default_action_priority(),
            action_context: default_action_context(),
            action_caller_id: default_action_caller_id(),
        }
    }
}

impl DefaultConfig {
    pub fn action_defaults(&self) -> ActionDefaults {
        ActionDefaults {
            response_timeout: Duration::from_secs(self.action_response_timeout),
            event_timeout: Duration::from_secs(self.action_event_timeout),
            priority: self.action_priority,
            context: self.action_context.clone(),
            caller_id: self.action_caller_id.clone(),
        }
    }
}

/// Event filter: `event` is one name or a `|`-separated list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub event: String,

    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

/// One exposed metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub labels: Vec<LabelConfig>,

    pub value: ValueConfig,
}

/// Label name and the expression producing its value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    pub name: String,
    pub value: ValueExpr,
}

/// Metric kind and its value expressions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ValueConfig {
    Counter {
        #[serde(default = "default_increment_value")]
        increment_value: ValueExpr,
    },

    Gauge {
        #[serde(default)]
        set_value: Option<ValueExpr>,

        #[serde(default)]
        increment_value: Option<ValueExpr>,

        #[serde(default)]
        value_on_scrape_start: Option<f64>,
    },
}

/// Scrape loop configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Seconds between cycles; `default.scrape_interval` when unset
    #[serde(default)]
    pub interval: Option<u64>,

    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

/// One action; unset fields fall back to [`DefaultConfig`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    pub name: String,

    /// Terminal event name
    pub until: String,

    #[serde(default)]
    pub response_timeout: Option<u64>,

    #[serde(default)]
    pub event_timeout: Option<u64>,

    #[serde(default, alias = "action_priority")]
    pub priority: Option<u32>,

    #[serde(default, alias = "action_context")]
    pub context: Option<String>,

    #[serde(default, alias = "action_caller_id")]
    pub caller_id: Option<String>,

    /// Filters attached while the action runs
    #[serde(default)]
    pub collect: Vec<FilterConfig>,
}

/// Registered filters and actions ready for the scrape loop
#[derive(Debug)]
pub struct ScrapePlan {
    pub standing_filters: Vec<Arc<EventFilter>>,
    pub actions: Vec<Action>,
    pub interval: Duration,
}

// Default value helpers
fn default_ami_port() -> u16 {
    5038
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_login_validation_timeout() -> u64 {
    10
}

fn default_fully_booted_validation_timeout() -> u64 {
    60
}

fn default_response_timeout() -> u64 {
    10
}

fn default_ping_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_scrape_interval() -> u64 {
    10
}

fn default_action_response_timeout() -> u64 {
    5
}

fn default_action_event_timeout() -> u64 {
    10
}

fn default_action_priority() -> u32 {
    1
}

fn default_action_context() -> String {
    "default".to_string()
}

fn default_action_caller_id() -> String {
    "ami-exporter".to_string()
}

fn default_increment_value() -> ValueExpr {
    ValueExpr::literal("1")
}

impl ExporterConfig {
    /// Load and validate configuration from a YAML file with environment
    /// overrides (`AMI_EXPORTER__AMI_CLIENT__SECRET=...`)
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_string_lossy();

        let config: Self = config::Config::builder()
            .add_source(config::File::new(&path, config::FileFormat::Yaml).required(true))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate an in-memory YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the exporter cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ami_client.ip.trim().is_empty() {
            return Err(invalid("ami_client.ip must not be empty"));
        }
        if self.ami_client.port == 0 {
            return Err(invalid("ami_client.port must not be 0"));
        }
        if self.ami_client.username.trim().is_empty() {
            return Err(invalid("ami_client.username must not be empty"));
        }
        if self.scrape_interval().is_zero() {
            return Err(invalid("scrape interval must be at least 1s"));
        }

        for (i, filter) in self.filter.iter().enumerate() {
            validate_filter(filter, &format!("filter[{}]", i))?;
        }

        for (i, action) in self.scrape.actions.iter().enumerate() {
            let path = format!("scrape.actions[{}]", i);
            if action.name.trim().is_empty() {
                return Err(invalid(format!("{}.name must not be empty", path)));
            }
            if action.until.trim().is_empty() {
                return Err(invalid(format!("{}.until must not be empty", path)));
            }
            let event_timeout = action
                .event_timeout
                .unwrap_or(self.default.action_event_timeout);
            if event_timeout == 0 {
                return Err(invalid(format!("{}: event timeout must be at least 1s", path)));
            }
            for (j, filter) in action.collect.iter().enumerate() {
                validate_filter(filter, &format!("{}.collect[{}]", path, j))?;
            }
        }

        Ok(())
    }

    /// Seconds between scrape cycles
    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(
            self.scrape
                .interval
                .unwrap_or(self.default.scrape_interval),
        )
    }

    /// Build and register standing filters and actions
    pub fn build(&self, registry: &MetricsRegistry) -> Result<ScrapePlan, ConfigError> {
        let standing_filters = self
            .filter
            .iter()
            .map(|filter| build_filter(filter, registry).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let defaults = self.default.action_defaults();
        let actions = self
            .scrape
            .actions
            .iter()
            .map(|action| build_action(action, &defaults, registry))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ScrapePlan {
            standing_filters,
            actions,
            interval: self.scrape_interval(),
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            host: self.ami_client.ip.clone(),
            port: self.ami_client.port,
            connect_timeout: Duration::from_secs(self.general.connect_timeout),
            response_timeout: Duration::from_secs(self.general.response_timeout),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            login_timeout: Duration::from_secs(self.general.login_validation_timeout),
            boot_timeout: Duration::from_secs(self.general.fully_booted_validation_timeout),
            ping_timeout: Duration::from_secs(self.general.ping_timeout),
            reconnect: self.general.reconnect.clone(),
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.ami_client.username, &self.ami_client.secret)
    }

    /// `general.log_level` as a tracing filter directive
    pub fn log_level(&self) -> String {
        normalize_log_level(&self.general.log_level)
    }
}

/// Map the logging level names older configurations use onto tracing levels
pub fn normalize_log_level(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn validate_filter(filter: &FilterConfig, path: &str) -> Result<(), ConfigError> {
    if filter.event.split('|').any(|name| name.trim().is_empty()) {
        return Err(invalid(format!(
            "{}.event contains an empty event name: {:?}",
            path, filter.event
        )));
    }

    for (i, metric) in filter.metrics.iter().enumerate() {
        let metric_path = format!("{}.metrics[{}]", path, i);
        if metric.name.trim().is_empty() {
            return Err(invalid(format!("{}.name must not be empty", metric_path)));
        }

        let mut seen = HashSet::new();
        for label in &metric.labels {
            if label.name.trim().is_empty() {
                return Err(invalid(format!(
                    "{} ({}): label name must not be empty",
                    metric_path, metric.name
                )));
            }
            if !seen.insert(label.name.as_str()) {
                return Err(invalid(format!(
                    "{} ({}): duplicate label {:?}",
                    metric_path, metric.name, label.name
                )));
            }
        }

        if let ValueConfig::Gauge {
            set_value: None,
            increment_value: None,
            ..
        } = metric.value
        {
            warn!(metric = %metric.name, "Gauge has neither set_value nor increment_value");
        }
    }

    Ok(())
}

fn build_metric(config: &MetricConfig) -> Box<dyn MetricValue> {
    let descriptor = config.labels.iter().fold(
        MetricDescriptor::new(&config.name, &config.description),
        |descriptor, label| descriptor.with_label(&label.name, label.value.clone()),
    );

    match &config.value {
        ValueConfig::Counter { increment_value } => {
            Box::new(CounterValue::new(descriptor, increment_value.clone()))
        }
        ValueConfig::Gauge {
            set_value,
            increment_value,
            value_on_scrape_start,
        } => {
            let mut gauge = GaugeValue::new(descriptor);
            if let Some(expr) = set_value {
                gauge = gauge.with_set_value(expr.clone());
            }
            if let Some(expr) = increment_value {
                gauge = gauge.with_increment(expr.clone());
            }
            if let Some(value) = value_on_scrape_start {
                gauge = gauge.with_value_on_scrape_start(*value);
            }
            Box::new(gauge)
        }
    }
}

fn build_filter(config: &FilterConfig, registry: &MetricsRegistry) -> Result<EventFilter, ConfigError> {
    let metrics = config.metrics.iter().map(build_metric).collect();
    let filter = EventFilter::new(split_event_names(&config.event), metrics);
    filter.register(registry.registry())?;
    Ok(filter)
}

fn build_action(
    config: &ActionConfig,
    defaults: &ActionDefaults,
    registry: &MetricsRegistry,
) -> Result<Action, ConfigError> {
    let mut action = Action::new(&config.name, &config.until, defaults);
    if let Some(secs) = config.response_timeout {
        action.response_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = config.event_timeout {
        action.event_timeout = Duration::from_secs(secs);
    }
    if let Some(priority) = config.priority {
        action.priority = priority;
    }
    if let Some(context) = &config.context {
        action.context = context.clone();
    }
    if let Some(caller_id) = &config.caller_id {
        action.caller_id = caller_id.clone();
    }
    for filter in &config.collect {
        action = action.with_filter(build_filter(filter, registry)?);
    }
    Ok(action)
}
