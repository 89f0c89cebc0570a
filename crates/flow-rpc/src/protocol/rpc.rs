//! Request/response adapter.
//!
//! `send` is fire-and-forget over `message`; `call` correlates an `rpc.req`
//! with the matching `rpc::response`.

use super::await_reply;
use crate::connection::{ClientBuilder, Connection, InboundRouter};
use crate::domain::config::{ClientConfig, ConfigError, TraceLevel};
use crate::domain::correlation::CorrelationId;
use crate::domain::envelope::{InboundFrame, OutboundFrame, RequestBody, ResponseKind};
use crate::domain::error::{RpcError, RpcResult};
use crate::domain::invocation::{Invocation, Reply};
use crate::ports::transport::Transport;
use flow_events::{EventFilter, HandlerId, Subscription};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

struct RpcRouter;

impl InboundRouter for RpcRouter {
    fn route(&self, conn: &Connection, frame: InboundFrame) {
        match frame {
            InboundFrame::Message { subject, data } => {
                conn.notify(&subject, &data);
            }
            InboundFrame::Response {
                kind: ResponseKind::Rpc,
                rid,
                error,
                data,
            } => {
                conn.resolve_response(rid, error, data);
            }
            other => {
                debug!(client_id = %conn.id(), kind = other.kind(), "Frame not handled by RPC client");
            }
        }
    }
}

impl ClientBuilder {
    /// Build a request/response client.
    pub fn build_rpc(self) -> Result<RpcClient, ConfigError> {
        Ok(RpcClient {
            conn: self.build_connection(Arc::new(RpcRouter))?,
        })
    }
}

/// Request/response client.
#[derive(Clone)]
pub struct RpcClient {
    conn: Arc<Connection>,
}

impl RpcClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        ClientBuilder::new(config, transport).build_rpc()
    }

    pub async fn connect(&self) -> RpcResult<()> {
        self.conn.connect().await
    }

    pub async fn close(&self) {
        self.conn.close().await;
    }

    /// Register a handler for uncorrelated messages and lifecycle
    /// notifications named `subject`.
    pub fn on<F>(&self, subject: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.conn.events().on(subject, handler)
    }

    pub fn off(&self, subject: &str, id: HandlerId) -> bool {
        self.conn.events().off(subject, id)
    }

    /// Fire-and-forget message. Nothing is registered.
    pub fn send(&self, subject: &str, data: Value) -> RpcResult<()> {
        if subject.is_empty() {
            return Err(RpcError::InvalidInvocation("empty subject".into()));
        }
        self.conn
            .transmit(&OutboundFrame::Message(RequestBody::new(subject, data)))
    }

    /// Correlated call. `callback` runs exactly once with the response, a
    /// timeout, or a connection failure.
    pub fn call<F>(&self, subject: &str, data: Value, callback: F) -> CorrelationId
    where
        F: FnOnce(RpcResult<Value>) + Send + 'static,
    {
        self.call_with(subject, data, Reply::callback(callback))
    }

    /// Send or call depending on whether `invocation` carries a reply.
    pub fn dispatch(&self, invocation: Invocation) -> RpcResult<Option<CorrelationId>> {
        invocation.validate()?;
        let (subject, data, reply) = invocation.into_parts();
        match reply {
            Some(reply) => Ok(Some(self.call_with(&subject, data, reply))),
            None => self.send(&subject, data).map(|()| None),
        }
    }

    /// Correlated call awaiting the result.
    ///
    /// Dropping the future withdraws the pending entry.
    pub async fn call_async(&self, subject: &str, data: Value) -> RpcResult<Value> {
        let (reply, rx) = Reply::channel();
        let id = self.call_with(subject, data, reply);
        await_reply(&self.conn, id, rx).await
    }

    pub fn lifecycle(&self, filter: EventFilter) -> Subscription {
        self.conn.lifecycle(filter)
    }

    pub fn set_trace(&self, level: TraceLevel) {
        self.conn.set_trace(level);
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    fn call_with(&self, subject: &str, data: Value, reply: Reply) -> CorrelationId {
        self.conn.issue(subject, reply, |rid| OutboundFrame::RpcRequest {
            rid,
            req: RequestBody::new(subject, data),
        })
    }
}
