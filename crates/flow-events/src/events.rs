//! # Connection Events
//!
//! Lifecycle notifications emitted by a connection, plus the filter used to
//! select among them.

use serde::{Deserialize, Serialize};

/// Lifecycle notifications published by a connection.
///
/// Every variant carries the client-assigned id so observers of a shared bus
/// can tell connections apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// `connect()` was invoked and the transport is being opened.
    Connecting { client_id: String },

    /// The transport reports an established link.
    Connected { client_id: String, generation: u64 },

    /// The transport reports the remote side is ready to serve.
    Ready { client_id: String },

    /// The transport failed to establish a link.
    ConnectError { client_id: String, reason: String },

    /// The transport reported a generic error.
    Error { client_id: String, reason: String },

    /// The link went away. Pending requests are drained right after this.
    Disconnected { client_id: String, reason: String },

    /// The transport reports the remote side as offline.
    Offline { client_id: String },

    /// `close()` completed.
    Closed { client_id: String },
}

impl ConnectionEvent {
    /// Notification subject this event is mirrored under in the handler table.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting { .. } => "rpc-connecting",
            Self::Connected { .. } => "rpc-connect",
            Self::Ready { .. } => "rpc-ready",
            Self::ConnectError { .. } => "rpc-connect-error",
            Self::Error { .. } => "rpc-error",
            Self::Disconnected { .. } => "rpc-disconnect",
            Self::Offline { .. } => "offline",
            Self::Closed { .. } => "rpc-closed",
        }
    }

    /// Get the topic of this event for filtering.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::ConnectError { .. } | Self::Error { .. } => EventTopic::Fault,
            _ => EventTopic::Lifecycle,
        }
    }

    /// Id of the client that emitted this event.
    #[must_use]
    pub fn client_id(&self) -> &str {
        match self {
            Self::Connecting { client_id }
            | Self::Connected { client_id, .. }
            | Self::Ready { client_id }
            | Self::ConnectError { client_id, .. }
            | Self::Error { client_id, .. }
            | Self::Disconnected { client_id, .. }
            | Self::Offline { client_id }
            | Self::Closed { client_id } => client_id,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// State transitions (connecting, connected, ready, disconnected, ...).
    Lifecycle,
    /// Transport errors that do not change connection state.
    Fault,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Notification names to include. Empty means all names.
    pub names: Vec<&'static str>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            names: Vec::new(),
        }
    }

    /// Create a filter for specific notification names.
    #[must_use]
    pub fn names(names: Vec<&'static str>) -> Self {
        Self {
            topics: Vec::new(),
            names,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &ConnectionEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let name_match = self.names.is_empty() || self.names.contains(&event.name());

        topic_match && name_match
    }
}
