//! Single dispatch point for session events.
//!
//! Standing filters see every event. Action-scoped filters are registered
//! under their correlation id and only see events carrying that id. A
//! completion waiter per correlation id fires on the first event named
//! `until` with the matching id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ami_metrics::EventFilter;
use ami_protocol::{Event, EventListener};
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

struct CompletionWaiter {
    until: String,
    tx: oneshot::Sender<Event>,
}

/// Resolves when the terminal event of an armed action is observed.
pub struct CompletionHandle {
    rx: oneshot::Receiver<Event>,
}

impl CompletionHandle {
    /// Wait up to `timeout` for the terminal event.
    pub async fn wait(self, timeout: Duration) -> Option<Event> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(event)) => Some(event),
            // Sender dropped on disarm or timed out.
            Ok(Err(_)) | Err(_) => None,
        }
    }
}

/// Registry of attached filters keyed by correlation id.
pub struct EventDispatcher {
    standing: RwLock<Vec<Arc<EventFilter>>>,
    scoped: RwLock<HashMap<String, Vec<Arc<EventFilter>>>>,
    waiters: Mutex<HashMap<String, CompletionWaiter>>,
    last_event: Mutex<Instant>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            standing: RwLock::new(Vec::new()),
            scoped: RwLock::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
            last_event: Mutex::new(Instant::now()),
        }
    }

    /// Attach filters that stay active for the life of the session.
    pub fn add_standing_filters(&self, filters: impl IntoIterator<Item = Arc<EventFilter>>) {
        let mut standing = self.standing.write();
        for filter in filters {
            debug!(events = ?filter.event_names(), "Attach standing event filter");
            standing.push(filter);
        }
    }

    pub fn standing_filter_count(&self) -> usize {
        self.standing.read().len()
    }

    /// Attach action-scoped filters and a completion waiter under `correlation_id`.
    pub fn attach(
        &self,
        correlation_id: &str,
        filters: Vec<Arc<EventFilter>>,
        until: &str,
    ) -> CompletionHandle {
        let (tx, rx) = oneshot::channel();
        self.scoped.write().insert(correlation_id.to_string(), filters);
        self.waiters.lock().insert(
            correlation_id.to_string(),
            CompletionWaiter {
                until: until.to_string(),
                tx,
            },
        );
        CompletionHandle { rx }
    }

    /// Remove the filters and waiter registered under `correlation_id`.
    pub fn detach(&self, correlation_id: &str) -> Vec<Arc<EventFilter>> {
        self.waiters.lock().remove(correlation_id);
        self.scoped
            .write()
            .remove(correlation_id)
            .unwrap_or_default()
    }

    /// Number of correlation ids with attached filters.
    pub fn scoped_count(&self) -> usize {
        self.scoped.read().len()
    }

    pub fn last_event(&self) -> Instant {
        *self.last_event.lock()
    }

    /// Mark the session as active now.
    pub fn touch(&self) {
        *self.last_event.lock() = Instant::now();
    }

    /// Time since the last event or successful probe.
    pub fn idle_for(&self) -> Duration {
        self.last_event.lock().elapsed()
    }

    fn complete(&self, correlation_id: &str, event: &Event) {
        let mut waiters = self.waiters.lock();
        let is_terminal = waiters
            .get(correlation_id)
            .is_some_and(|waiter| waiter.until == event.name());
        if !is_terminal {
            return;
        }
        if let Some(waiter) = waiters.remove(correlation_id) {
            debug!(event = event.name(), action_id = %correlation_id, "Collected terminal event");
            let _ = waiter.tx.send(event.clone());
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventListener for EventDispatcher {
    fn on_event(&self, event: &Event) {
        self.touch();

        for filter in self.standing.read().iter() {
            filter.process_event(event);
        }

        let Some(correlation_id) = event.action_id() else {
            return;
        };
        if let Some(filters) = self.scoped.read().get(correlation_id) {
            for filter in filters {
                filter.process_event(event);
            }
        }
        // Filters see the terminal event before the waiter is released.
        self.complete(correlation_id, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ami_metrics::{CounterValue, MetricDescriptor, MetricValue, MetricsRegistry, ValueExpr};

    fn counting_filter(pattern: &str, name: &str) -> (Arc<EventFilter>, Arc<CounterValue>) {
        let counter = Arc::new(CounterValue::new(
            MetricDescriptor::new(name, name),
            ValueExpr::literal("1"),
        ));
        counter.register(MetricsRegistry::new().registry()).unwrap();
        let filter = EventFilter::from_pattern(pattern, vec![Box::new(counter.clone())]);
        (Arc::new(filter), counter)
    }

    #[test]
    fn test_standing_filters_see_all_events() {
        let dispatcher = EventDispatcher::new();
        let (filter, counter) = counting_filter("Hangup", "hangups_total");
        dispatcher.add_standing_filters([filter]);

        dispatcher.on_event(&Event::new("Hangup"));
        dispatcher.on_event(&Event::new("Hangup").with_key("ActionID", "x-1"));
        dispatcher.on_event(&Event::new("Newchannel"));

        assert_eq!(counter.get(&[]).unwrap(), 2.0);
    }

    #[test]
    fn test_scoped_filters_require_correlation() {
        let dispatcher = EventDispatcher::new();
        let (filter, counter) = counting_filter("PeerEntry", "peers_total");
        filter.on_scrape_start("x-1");
        let _completion = dispatcher.attach("x-1", vec![filter.clone()], "PeerlistComplete");

        dispatcher.on_event(&Event::new("PeerEntry"));
        dispatcher.on_event(&Event::new("PeerEntry").with_key("ActionID", "x-2"));
        dispatcher.on_event(&Event::new("PeerEntry").with_key("ActionID", "x-1"));
        assert_eq!(counter.get(&[]).unwrap(), 1.0);

        let detached = dispatcher.detach("x-1");
        assert_eq!(detached.len(), 1);
        assert_eq!(dispatcher.scoped_count(), 0);

        dispatcher.on_event(&Event::new("PeerEntry").with_key("ActionID", "x-1"));
        assert_eq!(counter.get(&[]).unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_completion_on_terminal_event() {
        let dispatcher = EventDispatcher::new();
        let completion = dispatcher.attach("x-9", Vec::new(), "PeerlistComplete");

        dispatcher.on_event(&Event::new("PeerlistComplete").with_key("ActionID", "x-8"));
        dispatcher.on_event(&Event::new("PeerEntry").with_key("ActionID", "x-9"));
        dispatcher.on_event(&Event::new("PeerlistComplete").with_key("ActionID", "x-9"));

        let event = completion.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(event.action_id(), Some("x-9"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_times_out() {
        let dispatcher = EventDispatcher::new();
        let completion = dispatcher.attach("x-3", Vec::new(), "Hangup");

        dispatcher.on_event(&Event::new("Hangup").with_key("ActionID", "x-4"));
        assert!(completion.wait(Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_refresh_last_event() {
        let dispatcher = EventDispatcher::new();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(dispatcher.idle_for() >= Duration::from_secs(30));

        dispatcher.on_event(&Event::new("VarSet"));
        assert_eq!(dispatcher.idle_for(), Duration::ZERO);
    }
}
