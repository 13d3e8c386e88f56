//! Observer list for supervisor events

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;

use crate::core::{OutputChannel, SupervisorEvent};

/// Which events a subscription receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Stdout,
    Stderr,
    Completion,
    All,
}

impl Topic {
    fn matches(&self, event: &SupervisorEvent) -> bool {
        match (self, event) {
            (Topic::All, _) => true,
            (Topic::Stdout, SupervisorEvent::Output(output)) => output.channel == OutputChannel::Stdout,
            (Topic::Stderr, SupervisorEvent::Output(output)) => output.channel == OutputChannel::Stderr,
            (Topic::Completion, SupervisorEvent::Completion(_)) => true,
            _ => false,
        }
    }
}

struct Subscriber {
    id: u64,
    topic: Topic,
    tx: mpsc::UnboundedSender<SupervisorEvent>,
}

/// Fan-out of supervisor events to any number of subscribers.
///
/// Each subscriber has its own unbounded queue; events are delivered in
/// publish order and never replayed to later subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber
    pub fn subscribe(self: &Arc<Self>, topic: Topic) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(Subscriber { id, topic, tx });

        Subscription {
            id,
            topic,
            rx,
            bus: Arc::downgrade(self),
        }
    }

    /// Deliver an event to every matching subscriber
    pub fn publish(&self, event: SupervisorEvent) {
        let mut subscribers = self.lock();
        subscribers.retain(|s| !s.tx.is_closed());
        for subscriber in subscribers.iter().filter(|s| s.topic.matches(&event)) {
            let _ = subscriber.tx.send(event.clone());
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.lock().retain(|s| s.id != id);
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    topic: Topic,
    rx: mpsc::UnboundedReceiver<SupervisorEvent>,
    bus: Weak<EventBus>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Wait for the next event
    pub async fn recv(&mut self) -> Option<SupervisorEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<SupervisorEvent> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving events
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}
