//! Scripted in-memory connection for tests.
//!
//! Replies are scripted per action name. Events attached to a reply are
//! stamped with the action's `ActionID` (unless they carry one already) and
//! delivered to the listeners before the response is returned.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connection::{AmiConnection, EventListener, ListenerId, ListenerSet};
use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{ActionId, ActionRequest, Event, Response, ACTION_ID_KEY};

/// Scripted outcome of one action.
#[derive(Debug, Clone)]
pub struct MockReply {
    response: Option<Response>,
    events: Vec<Event>,
}

impl MockReply {
    pub fn success() -> Self {
        Self::respond(Response::success())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::respond(Response::error(message))
    }

    pub fn respond(response: Response) -> Self {
        Self {
            response: Some(response),
            events: Vec::new(),
        }
    }

    /// No response at all; the caller observes a timeout.
    pub fn no_response() -> Self {
        Self {
            response: None,
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }
}

/// In-memory [`AmiConnection`] driven by scripted replies.
pub struct MockConnection {
    listeners: ListenerSet,
    replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
    sent: Mutex<Vec<ActionRequest>>,
    id_counter: AtomicU64,
    connected: AtomicBool,
    event_loop_alive: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    failing_connects: AtomicUsize,
    confirm_auth: AtomicBool,
    confirm_boot: AtomicBool,
    response_timeout: Duration,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::with_response_timeout(Duration::from_secs(10))
    }

    pub fn with_response_timeout(response_timeout: Duration) -> Self {
        Self {
            listeners: ListenerSet::new(),
            replies: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            id_counter: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            event_loop_alive: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            failing_connects: AtomicUsize::new(0),
            confirm_auth: AtomicBool::new(true),
            confirm_boot: AtomicBool::new(true),
            response_timeout,
        }
    }

    /// Queue a reply for `action`. The last queued reply is reused once the
    /// queue drains to it; unscripted actions answer `Success`.
    pub fn script(&self, action: &str, reply: MockReply) {
        self.replies
            .lock()
            .entry(action.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Choose which login confirmations are emitted after a successful `Login`.
    pub fn set_login_confirmations(&self, auth: bool, boot: bool) {
        self.confirm_auth.store(auth, Ordering::SeqCst);
        self.confirm_boot.store(boot, Ordering::SeqCst);
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.failing_connects.store(count, Ordering::SeqCst);
    }

    pub fn set_event_loop_alive(&self, alive: bool) {
        self.event_loop_alive.store(alive, Ordering::SeqCst);
    }

    /// Deliver an unsolicited event to the listeners.
    pub fn emit(&self, event: Event) {
        self.listeners.dispatch(&event);
    }

    pub fn sent_actions(&self) -> Vec<ActionRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_names(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|action| action.name().to_string())
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn next_reply(&self, action: &str) -> MockReply {
        let mut replies = self.replies.lock();
        match replies.get_mut(action) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(MockReply::success),
            Some(queue) => queue.front().cloned().unwrap_or_else(MockReply::success),
            None => MockReply::success(),
        }
    }

    async fn play(
        &self,
        action: &ActionRequest,
        action_id: &str,
        timeout: Duration,
    ) -> ProtocolResult<Option<Response>> {
        if !self.is_connected() {
            return Err(ProtocolError::NotConnected);
        }

        let reply = self.next_reply(action.name());
        let Some(mut response) = reply.response else {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        };
        response.insert(ACTION_ID_KEY, action_id);

        for mut event in reply.events {
            if event.action_id().is_none() {
                event.insert(ACTION_ID_KEY, action_id);
            }
            self.listeners.dispatch(&event);
        }
        Ok(Some(response))
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AmiConnection for MockConnection {
    async fn connect(&self) -> ProtocolResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(ProtocolError::Connect {
                addr: "mock".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }

        self.connected.store(true, Ordering::SeqCst);
        self.event_loop_alive.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.event_loop_alive.store(false, Ordering::SeqCst);
    }

    async fn login(&self, username: &str, secret: &str) -> ProtocolResult<Option<Response>> {
        let action_id = self.next_action_id();
        let action = ActionRequest::new("Login")
            .header("Username", username)
            .header("Secret", secret)
            .with_action_id(action_id.clone());
        self.sent.lock().push(action.clone());

        let response = self.play(&action, &action_id, self.response_timeout).await?;
        if response.as_ref().is_some_and(Response::is_success) {
            if self.confirm_auth.load(Ordering::SeqCst) {
                self.emit(Event::new("SuccessfulAuth").with_key("Status", "Success"));
            }
            if self.confirm_boot.load(Ordering::SeqCst) {
                self.emit(Event::new("FullyBooted").with_key("Status", "Fully Booted"));
            }
        }
        Ok(response)
    }

    async fn logoff(&self) -> ProtocolResult<()> {
        let result = self
            .send_action(ActionRequest::new("Logoff"), self.response_timeout)
            .await;
        self.disconnect().await;
        result.map(|_| ())
    }

    async fn send_action(
        &self,
        mut action: ActionRequest,
        timeout: Duration,
    ) -> ProtocolResult<Option<Response>> {
        let action_id = match action.action_id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.next_action_id();
                action.set_action_id(id.clone());
                id
            }
        };
        self.sent.lock().push(action.clone());
        self.play(&action, &action_id, timeout).await
    }

    fn add_event_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn clear_event_listeners(&self) {
        self.listeners.clear();
    }

    fn next_action_id(&self) -> ActionId {
        let n = self.id_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("mock-{}", n)
    }

    fn is_event_loop_alive(&self) -> bool {
        self.event_loop_alive.load(Ordering::SeqCst)
    }

    fn response_timeout(&self) -> Duration {
        self.response_timeout
    }
}
