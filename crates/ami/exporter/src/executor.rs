//! Runs one configured action at a time.
//!
//! Execution moves through `Idle -> Armed -> AwaitingResponse ->
//! AwaitingTerminalEvent -> Idle`. Teardown runs on every path, so a failed
//! action never leaves filters attached to the session.

use std::sync::Arc;
use std::time::Duration;

use ami_session::Session;
use thiserror::Error;
use tracing::{debug, error};

use crate::action::Action;

/// Where the executor is within one action run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Armed,
    AwaitingResponse,
    AwaitingTerminalEvent,
}

/// Why an action produced no complete result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    /// No response, a transport failure, or a non-`Success` status.
    #[error("unable to fetch {action}: {reason}")]
    SendFailure { action: String, reason: String },

    /// The terminal event did not arrive. Events collected so far are kept.
    #[error("unable to fetch {action}: reached event timeout of {}s", .timeout.as_secs())]
    EventTimeout { action: String, timeout: Duration },
}

impl ActionError {
    /// Label value for the runs counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            ActionError::SendFailure { .. } => "send_failure",
            ActionError::EventTimeout { .. } => "event_timeout",
        }
    }
}

/// Executes actions against a shared session.
///
/// `exec` takes `&mut self`: one executor runs one action at a time.
pub struct ActionExecutor {
    session: Arc<Session>,
    state: ExecutorState,
}

impl ActionExecutor {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            state: ExecutorState::Idle,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Send `action` and wait for its terminal event.
    pub async fn exec(&mut self, action: &Action) -> Result<(), ActionError> {
        let correlation_id = self.session.next_correlation_id();
        debug!(action = %action.name, action_id = %correlation_id, "Executing action");

        for filter in &action.filters {
            filter.on_scrape_start(&correlation_id);
        }
        let completion = self
            .session
            .arm(&correlation_id, action.filters.clone(), &action.until);
        self.state = ExecutorState::Armed;

        let result = match self.send(action, &correlation_id).await {
            Ok(()) => {
                self.state = ExecutorState::AwaitingTerminalEvent;
                match completion.wait(action.event_timeout).await {
                    Some(_) => {
                        debug!(action = %action.name, until = %action.until, "Collected terminal event");
                        Ok(())
                    }
                    None => Err(ActionError::EventTimeout {
                        action: action.name.clone(),
                        timeout: action.event_timeout,
                    }),
                }
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            error!(action = %action.name, action_id = %correlation_id, "{}", e);
        }

        for filter in &action.filters {
            filter.on_scrape_end();
        }
        self.session.disarm(&correlation_id);
        self.state = ExecutorState::Idle;

        debug!(action = %action.name, action_id = %correlation_id, "Finished processing action");
        result
    }

    async fn send(&mut self, action: &Action, correlation_id: &str) -> Result<(), ActionError> {
        self.state = ExecutorState::AwaitingResponse;

        let reason = match self
            .session
            .send_action(action.to_request(correlation_id), action.response_timeout)
            .await
        {
            Ok(Some(response)) if response.is_success() => return Ok(()),
            Ok(Some(response)) => format!(
                "action response: {}",
                response.message().map(str::to_string).unwrap_or_else(|| response.to_string())
            ),
            Ok(None) => format!(
                "did not receive response after {}s",
                action.response_timeout.as_secs()
            ),
            Err(e) => e.to_string(),
        };

        Err(ActionError::SendFailure {
            action: action.name.clone(),
            reason,
        })
    }
}
