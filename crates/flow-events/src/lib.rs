//! # Flow Events - Notification Mechanism for flow-rpc
//!
//! Two delivery paths share one [`EventBus`]:
//!
//! - **Subject handlers:** uncorrelated inbound messages are routed by subject
//!   to every handler registered with [`EventBus::on`].
//! - **Lifecycle broadcast:** connection state changes are published as
//!   [`ConnectionEvent`]s to any number of [`Subscription`]s, and mirrored to
//!   the subject table under their notification name (`rpc-connect`, ...).
//!
//! ```text
//!   inbound message ──emit(subject)──→ ┌──────────────┐ ──→ handler(data)
//!                                      │   EventBus   │
//!   lifecycle change ──publish()─────→ └──────────────┘ ──→ Subscription::recv()
//! ```
//!
//! Nothing in this crate participates in request correlation; handlers may
//! fire any number of times.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{ConnectionEvent, EventFilter, EventTopic};
pub use publisher::{EventBus, EventPublisher, Handler, HandlerId};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum lifecycle events to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
