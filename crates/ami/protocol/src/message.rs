//! AMI message types.
//!
//! The manager interface exchanges three kinds of blocks: actions sent by
//! the client, responses correlated to an action by its `ActionID`, and
//! unsolicited events. Attribute maps are case-sensitive and lookups return
//! `None` rather than an empty string when a key is absent.

use std::collections::BTreeMap;
use std::fmt;

/// Header carrying the correlation id on actions, responses and events.
pub const ACTION_ID_KEY: &str = "ActionID";

/// Correlation id assigned to an outgoing action.
pub type ActionId = String;

/// An asynchronous notification from the manager interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    name: String,
    keys: BTreeMap<String, String>,
}

impl Event {
    /// Create an event with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: BTreeMap::new(),
        }
    }

    /// Builder-style attribute insertion.
    pub fn with_key(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace an attribute.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.keys.insert(key.into(), value.into());
    }

    /// Event name (the value of the `Event` header).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an attribute.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    /// The correlation id, if the event was caused by an action.
    pub fn action_id(&self) -> Option<&str> {
        self.get(ACTION_ID_KEY)
    }

    /// All attributes except the event name.
    pub fn keys(&self) -> &BTreeMap<String, String> {
        &self.keys
    }
}

/// Status line of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    Error,
    Follows,
    Goodbye,
    Other(String),
}

impl ResponseStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Success" => ResponseStatus::Success,
            "Error" => ResponseStatus::Error,
            "Follows" => ResponseStatus::Follows,
            "Goodbye" => ResponseStatus::Goodbye,
            other => ResponseStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStatus::Success => write!(f, "Success"),
            ResponseStatus::Error => write!(f, "Error"),
            ResponseStatus::Follows => write!(f, "Follows"),
            ResponseStatus::Goodbye => write!(f, "Goodbye"),
            ResponseStatus::Other(other) => write!(f, "{}", other),
        }
    }
}

/// Reply to a single action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: ResponseStatus,
    keys: BTreeMap<String, String>,
    output: Vec<String>,
}

impl Response {
    pub fn new(status: ResponseStatus) -> Self {
        Self {
            status,
            keys: BTreeMap::new(),
            output: Vec::new(),
        }
    }

    pub fn success() -> Self {
        Self::new(ResponseStatus::Success)
    }

    /// An `Error` response carrying `Message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ResponseStatus::Error).with_key("Message", message)
    }

    pub fn with_key(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.keys.insert(key.into(), value.into());
    }

    pub fn push_output(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    pub fn status(&self) -> &ResponseStatus {
        &self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    pub fn action_id(&self) -> Option<&str> {
        self.get(ACTION_ID_KEY)
    }

    /// Human readable explanation attached by the server, if any.
    pub fn message(&self) -> Option<&str> {
        self.get("Message")
    }

    /// Free-form lines of a `Follows` response.
    pub fn output(&self) -> &[String] {
        &self.output
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{} ({})", self.status, message),
            None => write!(f, "{}", self.status),
        }
    }
}

/// An outgoing action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    name: String,
    headers: Vec<(String, String)>,
}

impl ActionRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers: Vec::new(),
        }
    }

    /// Append a header. Header order is preserved on the wire.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.set_action_id(action_id);
        self
    }

    /// Set the correlation id, replacing any previous one.
    pub fn set_action_id(&mut self, action_id: impl Into<String>) {
        let action_id = action_id.into();
        match self.headers.iter_mut().find(|(key, _)| key == ACTION_ID_KEY) {
            Some((_, value)) => *value = action_id,
            None => self.headers.push((ACTION_ID_KEY.to_string(), action_id)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn action_id(&self) -> Option<&str> {
        self.get(ACTION_ID_KEY)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_lookup() {
        let event = Event::new("Hangup")
            .with_key("Channel", "SIP/100-0001")
            .with_key(ACTION_ID_KEY, "abc-1");

        assert_eq!(event.name(), "Hangup");
        assert_eq!(event.get("Channel"), Some("SIP/100-0001"));
        assert_eq!(event.get("channel"), None);
        assert_eq!(event.action_id(), Some("abc-1"));
    }

    #[test]
    fn test_response_status() {
        assert!(Response::success().is_success());

        let error = Response::error("Permission denied");
        assert!(!error.is_success());
        assert_eq!(error.message(), Some("Permission denied"));
        assert_eq!(error.to_string(), "Error (Permission denied)");

        assert_eq!(
            ResponseStatus::parse("Pong"),
            ResponseStatus::Other("Pong".to_string())
        );
    }

    #[test]
    fn test_set_action_id_replaces_existing() {
        let mut action = ActionRequest::new("Status").with_action_id("first");
        action.set_action_id("second");

        assert_eq!(action.action_id(), Some("second"));
        assert_eq!(action.headers().len(), 1);
    }
}
