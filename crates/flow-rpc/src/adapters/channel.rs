//! In-memory transport for tests and in-process loopback.
//!
//! [`channel_pair`] returns the client-side [`ChannelTransport`] and a
//! [`ChannelPeer`] playing the remote end: the peer sees every frame the
//! client sends and can inject inbound frames and lifecycle signals.

use crate::domain::envelope::kinds;
use crate::ports::transport::{Transport, TransportError, TransportEvent, TransportEvents};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

/// A frame the client handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct SentFrame {
    pub kind: String,
    pub payload: Value,
}

impl SentFrame {
    /// `rid` of the frame, if it carries one.
    pub fn rid(&self) -> Option<&Value> {
        self.payload.get("rid")
    }

    /// Subject of the frame, wherever the kind keeps it.
    pub fn subject(&self) -> Option<&str> {
        self.payload
            .get("subject")
            .or_else(|| self.payload.get("req").and_then(|r| r.get("subject")))
            .and_then(Value::as_str)
    }
}

struct ChannelState {
    events_rx: Option<TransportEvents>,
    connected: bool,
    endpoint: Option<String>,
}

/// Client side of an in-memory link.
pub struct ChannelTransport {
    state: Mutex<ChannelState>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    outbound_tx: mpsc::UnboundedSender<SentFrame>,
    handshake: bool,
    refuse: Option<String>,
}

impl ChannelTransport {
    /// Skip the automatic `Connect` + `Ready` signals on connect.
    #[must_use]
    pub fn without_handshake(mut self) -> Self {
        self.handshake = false;
        self
    }

    /// Make every `connect` fail with `reason`.
    #[must_use]
    pub fn refusing(mut self, reason: impl Into<String>) -> Self {
        self.refuse = Some(reason.into());
        self
    }

    /// Endpoint passed to the last successful `connect`.
    pub fn endpoint(&self) -> Option<String> {
        self.state.lock().endpoint.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&self, endpoint: &str, _args: &Value) -> Result<TransportEvents, TransportError> {
        if let Some(reason) = &self.refuse {
            return Err(TransportError::ConnectFailed(reason.clone()));
        }

        let events = {
            let mut state = self.state.lock();
            let events = state.events_rx.take().ok_or(TransportError::AlreadyConnected)?;
            state.connected = true;
            state.endpoint = Some(endpoint.to_string());
            events
        };

        debug!(endpoint = endpoint, "Channel transport connected");
        if self.handshake {
            let _ = self.events_tx.send(TransportEvent::Connect);
            let _ = self.events_tx.send(TransportEvent::Ready);
        }
        Ok(events)
    }

    fn send(&self, kind: &str, payload: Value) -> Result<(), TransportError> {
        if !self.state.lock().connected {
            return Err(TransportError::NotConnected);
        }
        self.outbound_tx
            .send(SentFrame {
                kind: kind.to_string(),
                payload,
            })
            .map_err(|_| TransportError::ChannelClosed)
    }

    async fn close(&self) {
        let was_connected = std::mem::replace(&mut self.state.lock().connected, false);
        if was_connected {
            let _ = self
                .events_tx
                .send(TransportEvent::Disconnect("io client disconnect".into()));
        }
    }
}

/// Remote end of an in-memory link.
pub struct ChannelPeer {
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    outbound_rx: mpsc::UnboundedReceiver<SentFrame>,
}

impl ChannelPeer {
    /// Next frame sent by the client, waiting for one if necessary.
    pub async fn next_frame(&mut self) -> Option<SentFrame> {
        self.outbound_rx.recv().await
    }

    /// Next frame sent by the client, if one is already queued.
    pub fn try_frame(&mut self) -> Option<SentFrame> {
        self.outbound_rx.try_recv().ok()
    }

    /// Inject an event. Returns false once the client side is gone.
    pub fn signal(&self, event: TransportEvent) -> bool {
        self.events_tx.send(event).is_ok()
    }

    /// Inject an inbound frame.
    pub fn deliver(&self, kind: &str, payload: Value) -> bool {
        self.signal(TransportEvent::Message {
            kind: kind.to_string(),
            payload,
        })
    }

    /// Answer a correlated frame with `data` using the given response kind.
    pub fn respond(&self, kind: &str, rid: &Value, data: Value) -> bool {
        self.deliver(kind, json!({ "rid": rid, "error": null, "data": data }))
    }

    /// Answer a correlated frame with an error value.
    pub fn respond_error(&self, kind: &str, rid: &Value, error: Value) -> bool {
        self.deliver(kind, json!({ "rid": rid, "error": error }))
    }

    /// Uncorrelated `message` frame.
    pub fn message(&self, subject: &str, data: Value) -> bool {
        self.deliver(kinds::MESSAGE, json!({ "subject": subject, "data": data }))
    }

    /// Simulate the link dropping.
    pub fn disconnect(&self, reason: &str) -> bool {
        self.signal(TransportEvent::Disconnect(reason.to_string()))
    }
}

/// Create a connected-on-demand transport and its remote end.
pub fn channel_pair() -> (ChannelTransport, ChannelPeer) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let transport = ChannelTransport {
        state: Mutex::new(ChannelState {
            events_rx: Some(events_rx),
            connected: false,
            endpoint: None,
        }),
        events_tx: events_tx.clone(),
        outbound_tx,
        handshake: true,
        refuse: None,
    };

    let peer = ChannelPeer {
        events_tx,
        outbound_rx,
    };

    (transport, peer)
}
