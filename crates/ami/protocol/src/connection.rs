//! Connection abstraction shared by the TCP client and test doubles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::ProtocolResult;
use crate::message::{ActionId, ActionRequest, Event, Response};

/// Handle returned when registering an [`EventListener`].
pub type ListenerId = u64;

/// Receives every event read from the connection.
///
/// Called synchronously from the reader task; implementations must not block.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event);
}

impl<F> EventListener for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// Contract of a manager interface connection.
#[async_trait]
pub trait AmiConnection: Send + Sync {
    /// Open the transport and read the greeting.
    async fn connect(&self) -> ProtocolResult<()>;

    /// Close the transport. Pending actions are released.
    async fn disconnect(&self);

    /// Send `Login`. `Ok(None)` means no response arrived in time.
    async fn login(&self, username: &str, secret: &str) -> ProtocolResult<Option<Response>>;

    /// Send `Logoff` and close the transport.
    async fn logoff(&self) -> ProtocolResult<()>;

    /// Send an action and wait up to `timeout` for its response.
    ///
    /// An `ActionID` is assigned when the action carries none.
    async fn send_action(
        &self,
        action: ActionRequest,
        timeout: Duration,
    ) -> ProtocolResult<Option<Response>>;

    fn add_event_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId;

    fn remove_event_listener(&self, id: ListenerId) -> bool;

    fn clear_event_listeners(&self);

    /// Produce a correlation id unique for the lifetime of this connection object.
    fn next_action_id(&self) -> ActionId;

    /// Whether the background reader is still consuming the stream.
    fn is_event_loop_alive(&self) -> bool;

    /// Default response timeout for housekeeping actions.
    fn response_timeout(&self) -> Duration;
}

/// Ordered set of listeners with stable ids.
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn EventListener>)>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.listeners.write().push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every listener in registration order.
    pub fn dispatch(&self, event: &Event) {
        // Snapshot so listeners may register or remove listeners themselves.
        let snapshot: Vec<Arc<dyn EventListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in snapshot {
            listener.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_dispatch_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let set = ListenerSet::new();

        let first = seen.clone();
        set.add(Arc::new(move |e: &Event| first.lock().push(format!("a:{}", e.name()))));
        let second = seen.clone();
        let id = set.add(Arc::new(move |e: &Event| second.lock().push(format!("b:{}", e.name()))));

        set.dispatch(&Event::new("Newchannel"));
        assert!(set.remove(id));
        assert!(!set.remove(id));
        set.dispatch(&Event::new("Hangup"));

        assert_eq!(
            *seen.lock(),
            vec!["a:Newchannel", "b:Newchannel", "a:Hangup"]
        );
    }
}
