//! The manager session: connection, dispatch point and login state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ami_metrics::EventFilter;
use ami_protocol::{
    ActionId, ActionRequest, AmiConnection, EventListener, ListenerId, ProtocolResult, Response,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::dispatch::{CompletionHandle, EventDispatcher};

/// Owns the connection and the single event dispatch point.
///
/// Recreated in place by disconnect and re-login, never duplicated.
pub struct Session {
    connection: Arc<dyn AmiConnection>,
    dispatcher: Arc<EventDispatcher>,
    dispatcher_listener: Mutex<Option<ListenerId>>,
    login_validated: AtomicBool,
}

impl Session {
    pub fn new(connection: Arc<dyn AmiConnection>) -> Self {
        Self {
            connection,
            dispatcher: Arc::new(EventDispatcher::new()),
            dispatcher_listener: Mutex::new(None),
            login_validated: AtomicBool::new(false),
        }
    }

    pub fn connection(&self) -> &Arc<dyn AmiConnection> {
        &self.connection
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn next_correlation_id(&self) -> ActionId {
        self.connection.next_action_id()
    }

    /// Attach filters that receive events for the life of the session.
    pub fn attach_standing_filters(&self, filters: impl IntoIterator<Item = Arc<EventFilter>>) {
        self.dispatcher.add_standing_filters(filters);
    }

    /// Register the dispatch point with the connection if it is not already.
    pub fn attach_dispatcher(&self) {
        let mut listener = self.dispatcher_listener.lock();
        if listener.is_none() {
            let dispatcher: Arc<dyn EventListener> = self.dispatcher.clone();
            *listener = Some(self.connection.add_event_listener(dispatcher));
        }
    }

    /// Attach action-scoped filters and a completion watcher.
    pub fn arm(
        &self,
        correlation_id: &str,
        filters: Vec<Arc<EventFilter>>,
        until: &str,
    ) -> CompletionHandle {
        debug!(action_id = %correlation_id, filters = filters.len(), until = %until, "Arming action");
        self.dispatcher.attach(correlation_id, filters, until)
    }

    /// Detach everything armed under `correlation_id` and clear the filters'
    /// correlation.
    pub fn disarm(&self, correlation_id: &str) {
        for filter in self.dispatcher.detach(correlation_id) {
            filter.on_detach();
        }
    }

    pub async fn send_action(
        &self,
        action: ActionRequest,
        timeout: Duration,
    ) -> ProtocolResult<Option<Response>> {
        self.connection.send_action(action, timeout).await
    }

    /// Idle probe.
    pub async fn ping(&self) -> ProtocolResult<Option<Response>> {
        let action = ActionRequest::new("Ping").with_action_id(self.next_correlation_id());
        self.connection
            .send_action(action, self.connection.response_timeout())
            .await
    }

    pub fn is_login_validated(&self) -> bool {
        self.login_validated.load(Ordering::SeqCst)
    }

    pub(crate) fn set_login_validated(&self, validated: bool) {
        self.login_validated.store(validated, Ordering::SeqCst);
    }

    fn detach_listeners(&self) {
        self.connection.clear_event_listeners();
        *self.dispatcher_listener.lock() = None;
    }

    /// Log off and drop all listeners.
    pub async fn logoff(&self) {
        if let Err(e) = self.connection.logoff().await {
            warn!(error = %e, "Logoff failed");
        }
        self.detach_listeners();
        self.set_login_validated(false);
    }

    /// Drop the transport and listeners; standing filters stay registered.
    pub async fn disconnect(&self) {
        self.detach_listeners();
        self.connection.disconnect().await;
        self.set_login_validated(false);
    }
}
