//! # Event Publisher
//!
//! Defines the publishing side of the bus: lifecycle broadcast and the
//! subject handler table.

use crate::events::{ConnectionEvent, EventFilter};
use crate::subscriber::{EventStream, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Handler invoked for every message emitted on a subject.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifies one registered handler so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Trait for publishing lifecycle events to the bus.
pub trait EventPublisher: Send + Sync {
    /// Publish an event to the bus.
    ///
    /// # Returns
    ///
    /// The number of lifecycle subscribers plus subject handlers reached.
    fn publish(&self, event: ConnectionEvent) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// In-memory event bus.
///
/// Lifecycle events use `tokio::sync::broadcast` for multi-consumer delivery.
/// Subject handlers are called synchronously on the emitting task, outside
/// any internal lock, so a handler may register further handlers or emit.
pub struct EventBus {
    /// Broadcast sender for lifecycle events.
    sender: broadcast::Sender<ConnectionEvent>,

    /// Subject -> registered handlers, in registration order.
    handlers: DashMap<String, Vec<(HandlerId, Handler)>>,

    /// Source of handler ids.
    next_handler: AtomicU64,

    /// Total lifecycle events published.
    events_published: AtomicU64,

    /// Total subject emits.
    messages_emitted: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with specified lifecycle channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            handlers: DashMap::new(),
            next_handler: AtomicU64::new(1),
            events_published: AtomicU64::new(0),
            messages_emitted: AtomicU64::new(0),
            capacity,
        }
    }

    /// Register a handler for a subject.
    pub fn on<F>(&self, subject: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let subject = subject.into();
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::Relaxed));
        debug!(subject = %subject, handler = id.0, "Handler registered");
        self.handlers
            .entry(subject)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove one handler. Returns false if it was not registered on `subject`.
    pub fn off(&self, subject: &str, id: HandlerId) -> bool {
        let Some(mut list) = self.handlers.get_mut(subject) else {
            return false;
        };
        let before = list.len();
        list.retain(|(h, _)| *h != id);
        let removed = list.len() != before;
        let empty = list.is_empty();
        drop(list);

        if empty {
            self.handlers.remove_if(subject, |_, l| l.is_empty());
        }
        removed
    }

    /// Remove every handler for a subject, returning how many were removed.
    pub fn off_all(&self, subject: &str) -> usize {
        self.handlers
            .remove(subject)
            .map(|(_, list)| list.len())
            .unwrap_or(0)
    }

    /// Deliver `data` to every handler registered for `subject`.
    ///
    /// Returns the number of handlers invoked. Zero is not an error: nobody
    /// was interested.
    pub fn emit(&self, subject: &str, data: &Value) -> usize {
        self.messages_emitted.fetch_add(1, Ordering::Relaxed);

        let handlers: Vec<Handler> = match self.handlers.get(subject) {
            Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => {
                trace!(subject = subject, "No handlers for subject");
                return 0;
            }
        };

        for handler in &handlers {
            handler(data);
        }
        handlers.len()
    }

    /// Number of handlers registered for a subject.
    #[must_use]
    pub fn handler_count(&self, subject: &str) -> usize {
        self.handlers.get(subject).map(|l| l.len()).unwrap_or(0)
    }

    /// Subscribe to lifecycle events matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, names = ?filter.names, "New subscription created");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Get a stream of lifecycle events matching a filter.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        EventStream::new(self.sender.subscribe(), filter)
    }

    /// Get the number of active lifecycle subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the total number of subject emits.
    #[must_use]
    pub fn messages_emitted(&self) -> u64 {
        self.messages_emitted.load(Ordering::Relaxed)
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: ConnectionEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let name = event.name();
        let payload = serde_json::to_value(&event).unwrap_or(Value::Null);

        let receivers = self.sender.send(event).unwrap_or(0);
        let handlers = self.emit(name, &payload);

        debug!(
            event = name,
            receivers = receivers,
            handlers = handlers,
            "Lifecycle event published"
        );
        receivers + handlers
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
