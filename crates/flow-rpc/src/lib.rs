//! # Flow RPC - Client-side correlation layer
//!
//! Request/response RPC and publish/subscribe messaging over a persistent,
//! message-oriented duplex transport.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  RpcClient (send/call)        MessagingClient (publish/request)  │
//! └───────────────┬──────────────────────────────┬───────────────────┘
//!                 │ issue / transmit             │ route(frame)
//! ┌───────────────┴──────────────────────────────┴───────────────────┐
//! │                          Connection                              │
//! │   ┌──────────────────┐  ┌──────────────┐  ┌──────────────────┐   │
//! │   │ Pending Registry │←─│   Sweeper    │  │  EventBus        │   │
//! │   │ (Mutex<HashMap>) │  │ (interval)   │  │  (flow-events)   │   │
//! │   └──────────────────┘  └──────────────┘  └──────────────────┘   │
//! └───────────────┬──────────────────────────────────────────────────┘
//!                 │ Transport port (connect / send / close)
//!                 ▼
//!        socket-like duplex channel
//! ```
//!
//! Every correlated request is completed exactly once: by its response, by
//! the sweeper after `timeout`, or by the drain when the link drops.
//! Whichever removes the id from the registry first wins.
//!
//! # Usage
//!
//! ```ignore
//! use flow_rpc::{ClientConfig, RpcClient};
//!
//! let client = RpcClient::new(ClientConfig::new("https://node.example"), transport)?;
//! client.connect().await?;
//! let answer = client.call_async("echo", json!({"x": 1})).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod connection;
pub mod domain;
pub mod ports;
pub mod protocol;
pub mod sweeper;
pub mod telemetry;

// Re-export main types
pub use adapters::{channel_pair, ChannelPeer, ChannelTransport, SentFrame};
pub use connection::{ClientBuilder, Connection, ConnectionState, InboundRouter};
pub use domain::{
    ClientConfig, ConfigError, CorrelationId, EnvelopeError, IdGenerator, InboundFrame,
    Invocation, OutboundFrame, PendingRegistry, PendingStats, Reply, RequestBody, ResponseKind,
    RpcError, RpcResult, SequentialGenerator, TraceLevel, UuidV7Generator,
};
pub use ports::{Transport, TransportError, TransportEvent, TransportEvents};
pub use protocol::messaging::RequestHandler;
pub use protocol::{MessagingClient, RpcClient};
pub use telemetry::{init_logging, LogConfig, TelemetryError};

// Lifecycle notifications live in flow-events
pub use flow_events::{ConnectionEvent, EventBus, EventFilter, EventTopic, HandlerId, Subscription};
