//! Configured actions.

use std::sync::Arc;
use std::time::Duration;

use ami_metrics::EventFilter;
use ami_protocol::ActionRequest;

/// Values used for any action setting the configuration leaves out.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDefaults {
    pub response_timeout: Duration,
    pub event_timeout: Duration,
    pub priority: u32,
    pub context: String,
    pub caller_id: String,
}

impl Default for ActionDefaults {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(5),
            event_timeout: Duration::from_secs(10),
            priority: 1,
            context: "default".to_string(),
            caller_id: "ami-exporter".to_string(),
        }
    }
}

/// One protocol command, its terminal event and the filters collecting its
/// result events.
///
/// Built once at startup and shared by every scrape cycle.
#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub filters: Vec<Arc<EventFilter>>,
    pub until: String,
    pub response_timeout: Duration,
    pub event_timeout: Duration,
    pub priority: u32,
    pub context: String,
    pub caller_id: String,
}

impl Action {
    pub fn new(name: impl Into<String>, until: impl Into<String>, defaults: &ActionDefaults) -> Self {
        Self {
            name: name.into(),
            filters: Vec::new(),
            until: until.into(),
            response_timeout: defaults.response_timeout,
            event_timeout: defaults.event_timeout,
            priority: defaults.priority,
            context: defaults.context.clone(),
            caller_id: defaults.caller_id.clone(),
        }
    }

    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = timeout;
        self
    }

    /// The wire request for one execution under `correlation_id`.
    pub fn to_request(&self, correlation_id: &str) -> ActionRequest {
        ActionRequest::new(&self.name)
            .header("Priority", self.priority.to_string())
            .header("Context", &self.context)
            .header("CallerID", &self.caller_id)
            .with_action_id(correlation_id)
    }
}
