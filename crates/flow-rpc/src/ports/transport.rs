//! Transport port: the duplex channel the client rides on.
//!
//! The transport owns framing, handshakes and reconnection. The client only
//! needs to open it, hand it `(kind, payload)` frames and consume the
//! events it reports.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// Something the transport reports to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Remote side signalled it is ready to serve.
    Ready,
    /// Link established (also after a transport-level reconnect).
    Connect,
    /// Link could not be established.
    ConnectError(String),
    /// Generic transport error.
    Error(String),
    /// Link lost or closed.
    Disconnect(String),
    /// Remote side reported itself offline.
    Offline,
    /// An inbound frame.
    Message { kind: String, payload: Value },
}

/// Stream of events for one opened transport. Ends when the transport is
/// gone for good.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Transport error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport not connected")]
    NotConnected,
    #[error("transport already connected")]
    AlreadyConnected,
    #[error("channel closed")]
    ChannelClosed,
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Duplex, message-oriented transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the transport towards `endpoint`.
    ///
    /// `args` are the transport-specific options from the client config.
    async fn connect(&self, endpoint: &str, args: &Value) -> Result<TransportEvents, TransportError>;

    /// Queue one frame for transmission. Must not block.
    fn send(&self, kind: &str, payload: Value) -> Result<(), TransportError>;

    /// Close the transport. Implementations should report a
    /// [`TransportEvent::Disconnect`] once the link is down.
    async fn close(&self);
}
