//! Configuration parsing, validation and plan building.

use std::io::Write;
use std::time::Duration;

use ami_exporter::config::ValueConfig;
use ami_exporter::{ConfigError, ExporterConfig};
use ami_metrics::{MetricsRegistry, ValueExpr};

const FULL: &str = r#"
ami_client:
  host: pbx.example.org
  port: 5039
  username: exporter
  secret: s3cret

general:
  log_level: WARNING
  login_validation_timeout: 5
  ping_timeout: 60
  reconnect:
    max_attempts: 5
    failure_threshold: 2

default:
  scrape_interval: 15
  action_caller_id: exporter

filter:
  - event: Newchannel|Hangup
    metrics:
      - name: asterisk_channel_events_total
        description: Channel lifecycle events
        labels:
          - name: context
            value: $Context
        value:
          type: counter

scrape:
  actions:
    - name: CoreShowChannels
      until: CoreShowChannelsComplete
      event_timeout: 20
      action_priority: 2
      action_context: internal
      collect:
        - event: CoreShowChannel
          metrics:
            - name: asterisk_channel_duration_seconds
              description: Duration of active channels
              labels:
                - name: channel
                  value: $Channel
              value:
                type: gauge
                set_value: $Duration
                value_on_scrape_start: 0
    - name: QueueSummary
      until: QueueSummaryComplete
      response_timeout: 2
      collect:
        - event: QueueSummary
          metrics:
            - name: asterisk_queue_callers
              labels:
                - name: queue
                  value: $Queue
              value:
                type: gauge
                increment_value: $Callers
"#;

const MINIMAL: &str = r#"
ami_client:
  ip: 127.0.0.1
  username: exporter
  secret: secret
"#;

fn with_action(action: &str) -> String {
    format!("{}\nscrape:\n  actions:\n{}", MINIMAL, action)
}

fn assert_invalid(yaml: &str, needle: &str) {
    match ExporterConfig::from_yaml_str(yaml) {
        Err(ConfigError::Invalid(message)) => {
            assert!(message.contains(needle), "{:?} does not mention {:?}", message, needle)
        }
        other => panic!("expected invalid configuration, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_full_configuration() {
    let config = ExporterConfig::from_yaml_str(FULL).unwrap();

    assert_eq!(config.ami_client.ip, "pbx.example.org");
    assert_eq!(config.ami_client.port, 5039);
    assert_eq!(config.log_level(), "warn");
    assert_eq!(config.general.reconnect.max_attempts, 5);
    assert_eq!(config.general.reconnect.initial_backoff_ms, 500);
    assert_eq!(config.scrape_interval(), Duration::from_secs(15));

    let session = config.session_config();
    assert_eq!(session.login_timeout, Duration::from_secs(5));
    assert_eq!(session.boot_timeout, Duration::from_secs(60));
    assert_eq!(session.ping_timeout, Duration::from_secs(60));

    let client = config.client_config();
    assert_eq!(client.addr(), "pbx.example.org:5039");
    assert_eq!(client.response_timeout, Duration::from_secs(10));

    let gauge = &config.scrape.actions[0].collect[0].metrics[0];
    match &gauge.value {
        ValueConfig::Gauge {
            set_value,
            increment_value,
            value_on_scrape_start,
        } => {
            assert_eq!(set_value, &Some(ValueExpr::reference("Duration")));
            assert_eq!(increment_value, &None);
            assert_eq!(value_on_scrape_start, &Some(0.0));
        }
        other => panic!("expected gauge, got {:?}", other),
    }
}

#[test]
fn test_counter_increment_defaults_to_one() {
    let config = ExporterConfig::from_yaml_str(FULL).unwrap();
    match &config.filter[0].metrics[0].value {
        ValueConfig::Counter { increment_value } => {
            assert_eq!(increment_value, &ValueExpr::literal("1"))
        }
        other => panic!("expected counter, got {:?}", other),
    }
}

#[test]
fn test_numeric_expressions_accepted() {
    let yaml = format!(
        "{}\nfilter:\n  - event: Hangup\n    metrics:\n      - name: hangups_total\n        labels:\n          - name: server\n            value: 1\n        value:\n          type: counter\n          increment_value: 2\n",
        MINIMAL
    );
    let config = ExporterConfig::from_yaml_str(&yaml).unwrap();
    let metric = &config.filter[0].metrics[0];
    assert_eq!(metric.labels[0].value, ValueExpr::literal("1"));
    assert!(matches!(
        &metric.value,
        ValueConfig::Counter { increment_value } if *increment_value == ValueExpr::literal("2")
    ));
}

#[test]
fn test_build_applies_defaults_and_overrides() {
    let config = ExporterConfig::from_yaml_str(FULL).unwrap();
    let registry = MetricsRegistry::new();
    let plan = config.build(&registry).unwrap();

    assert_eq!(plan.interval, Duration::from_secs(15));
    assert_eq!(plan.standing_filters.len(), 1);
    assert_eq!(plan.standing_filters[0].event_names(), ["Newchannel", "Hangup"]);

    let channels = &plan.actions[0];
    assert_eq!(channels.name, "CoreShowChannels");
    assert_eq!(channels.until, "CoreShowChannelsComplete");
    assert_eq!(channels.event_timeout, Duration::from_secs(20));
    assert_eq!(channels.response_timeout, Duration::from_secs(5));
    assert_eq!(channels.priority, 2);
    assert_eq!(channels.context, "internal");
    assert_eq!(channels.caller_id, "exporter");
    assert_eq!(channels.filters.len(), 1);

    let queues = &plan.actions[1];
    assert_eq!(queues.response_timeout, Duration::from_secs(2));
    assert_eq!(queues.event_timeout, Duration::from_secs(10));
    assert_eq!(queues.priority, 1);
    assert_eq!(queues.context, "default");
}

#[test]
fn test_build_twice_on_one_registry_fails() {
    let config = ExporterConfig::from_yaml_str(FULL).unwrap();
    let registry = MetricsRegistry::new();
    config.build(&registry).unwrap();

    assert!(matches!(config.build(&registry), Err(ConfigError::Metric(_))));
}

#[test]
fn test_validation_errors() {
    assert_invalid(
        "ami_client:\n  ip: 127.0.0.1\n  port: 0\n  username: exporter\n  secret: s\n",
        "port",
    );
    assert_invalid(
        "ami_client:\n  ip: 127.0.0.1\n  username: ''\n  secret: s\n",
        "username",
    );
    assert_invalid(
        &format!("{}\nfilter:\n  - event: Hangup||Newchannel\n", MINIMAL),
        "empty event name",
    );
    assert_invalid(
        &format!(
            "{}\nfilter:\n  - event: Hangup\n    metrics:\n      - name: hangups_total\n        labels:\n          - name: channel\n            value: $Channel\n          - name: channel\n            value: $Uniqueid\n        value:\n          type: counter\n",
            MINIMAL
        ),
        "duplicate label",
    );
    assert_invalid(
        &with_action("    - name: Status\n      until: ''\n"),
        "until",
    );
    assert_invalid(
        &with_action("    - name: Status\n      until: StatusComplete\n      event_timeout: 0\n"),
        "event timeout",
    );
    assert_invalid(
        &format!("{}\ndefault:\n  scrape_interval: 0\n", MINIMAL),
        "scrape interval",
    );
}

#[test]
fn test_parse_errors() {
    assert!(matches!(
        ExporterConfig::from_yaml_str("general:\n  log_level: INFO\n"),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        ExporterConfig::from_yaml_str(&format!(
            "{}\nfilter:\n  - event: Hangup\n    metrics:\n      - name: x\n        value:\n          type: histogram\n",
            MINIMAL
        )),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
    file.write_all(FULL.as_bytes()).unwrap();

    let config = ExporterConfig::load(file.path()).unwrap();
    assert_eq!(config.ami_client.username, "exporter");
    assert_eq!(config.scrape.actions.len(), 2);
    assert_eq!(config.scrape.actions[0].priority, Some(2));
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = ExporterConfig::load(dir.path().join("missing.yml"));
    assert!(matches!(result, Err(ConfigError::Load(_))));
}

#[test]
fn test_environment_overrides_file() {
    let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
    file.write_all(MINIMAL.as_bytes()).unwrap();

    std::env::set_var("AMI_EXPORTER__GENERAL__CONNECT_TIMEOUT", "3");
    let config = ExporterConfig::load(file.path());
    std::env::remove_var("AMI_EXPORTER__GENERAL__CONNECT_TIMEOUT");

    let config = config.unwrap();
    assert_eq!(config.general.connect_timeout, 3);
    assert_eq!(config.client_config().connect_timeout, Duration::from_secs(3));
}
