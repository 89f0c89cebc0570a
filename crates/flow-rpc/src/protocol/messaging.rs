//! Publish/subscribe adapter with optional acknowledgments.
//!
//! Publish and subscribe are uncorrelated unless an ack reply is supplied.
//! `request` always correlates and refuses to send without a reply. Inbound
//! `request` frames are answered by handlers registered with
//! [`MessagingClient::on_request`].

use super::await_reply;
use crate::connection::{ClientBuilder, Connection, InboundRouter};
use crate::domain::config::{ClientConfig, ConfigError, TraceLevel};
use crate::domain::correlation::CorrelationId;
use crate::domain::envelope::{InboundFrame, OutboundFrame, RequestBody, ResponseKind};
use crate::domain::error::{RpcError, RpcResult};
use crate::domain::invocation::{Invocation, Reply};
use crate::ports::transport::Transport;
use dashmap::DashMap;
use flow_events::{EventFilter, HandlerId, Subscription};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Answers an inbound request. `Err` is sent back as the response `error`.
pub type RequestHandler = Arc<dyn Fn(&Value) -> Result<Value, Value> + Send + Sync>;

type RequestHandlers = Arc<DashMap<String, RequestHandler>>;

struct MessagingRouter {
    handlers: RequestHandlers,
}

impl MessagingRouter {
    fn answer(&self, conn: &Connection, rid: Value, subject: &str, data: &Value) {
        let handler = self
            .handlers
            .get(subject)
            .map(|entry| Arc::clone(entry.value()));

        let Some(handler) = handler else {
            warn!(client_id = %conn.id(), subject = subject, rid = %rid, "No request handler, request dropped");
            return;
        };

        let (error, data) = match handler(data) {
            Ok(data) => (None, data),
            Err(error) => (Some(error), Value::Null),
        };

        if let Err(e) = conn.transmit(&OutboundFrame::Response { rid, error, data }) {
            warn!(client_id = %conn.id(), subject = subject, error = %e, "Failed to answer request");
        }
    }
}

impl InboundRouter for MessagingRouter {
    fn route(&self, conn: &Connection, frame: InboundFrame) {
        match frame {
            InboundFrame::Message { subject, data } | InboundFrame::Publish { subject, data } => {
                conn.notify(&subject, &data);
            }
            InboundFrame::Response {
                kind: ResponseKind::Publish | ResponseKind::Generic,
                rid,
                error,
                data,
            } => {
                conn.resolve_response(rid, error, data);
            }
            InboundFrame::Request { rid, subject, data } => {
                self.answer(conn, rid, &subject, &data);
            }
            other => {
                debug!(client_id = %conn.id(), kind = other.kind(), "Frame not handled by messaging client");
            }
        }
    }
}

impl ClientBuilder {
    /// Build a publish/subscribe client.
    pub fn build_messaging(self) -> Result<MessagingClient, ConfigError> {
        let handlers: RequestHandlers = Arc::new(DashMap::new());
        let router = MessagingRouter {
            handlers: Arc::clone(&handlers),
        };
        Ok(MessagingClient {
            conn: self.build_connection(Arc::new(router))?,
            handlers,
        })
    }
}

/// Publish/subscribe client.
#[derive(Clone)]
pub struct MessagingClient {
    conn: Arc<Connection>,
    handlers: RequestHandlers,
}

impl MessagingClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        ClientBuilder::new(config, transport).build_messaging()
    }

    pub async fn connect(&self) -> RpcResult<()> {
        self.conn.connect().await
    }

    pub async fn close(&self) {
        self.conn.close().await;
    }

    /// Register a handler for messages, broadcasts and lifecycle
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

    /// Answer inbound requests for `subject`. Replaces any previous handler.
    pub fn on_request<F>(&self, subject: impl Into<String>, handler: F)
    where
        F: Fn(&Value) -> Result<Value, Value> + Send + Sync + 'static,
    {
        self.handlers.insert(subject.into(), Arc::new(handler));
    }

    pub fn off_request(&self, subject: &str) -> bool {
        self.handlers.remove(subject).is_some()
    }

    /// Publish `payload` on `subject`.
    ///
    /// With an `ack` the publish is correlated and its id returned; without
    /// one nothing is registered.
    pub fn publish(
        &self,
        subject: &str,
        payload: Value,
        ack: Option<Reply>,
    ) -> RpcResult<Option<CorrelationId>> {
        check_subject(subject)?;
        let req = RequestBody::new(subject, payload);
        match ack {
            Some(reply) => Ok(Some(self.conn.issue(subject, reply, |rid| {
                OutboundFrame::Publish { req, rid: Some(rid) }
            }))),
            None => self
                .conn
                .transmit(&OutboundFrame::Publish { req, rid: None })
                .map(|()| None),
        }
    }

    /// Publish and wait for the acknowledgment.
    pub async fn publish_acked(&self, subject: &str, payload: Value) -> RpcResult<()> {
        check_subject(subject)?;
        let (reply, rx) = Reply::channel();
        let req = RequestBody::new(subject, payload);
        let id = self.conn.issue(subject, reply, |rid| OutboundFrame::Publish {
            req,
            rid: Some(rid),
        });
        await_reply(&self.conn, id, rx).await.map(|_| ())
    }

    /// Subscribe to `subject`, optionally acknowledged.
    pub fn subscribe(&self, subject: &str, ack: Option<Reply>) -> RpcResult<Option<CorrelationId>> {
        check_subject(subject)?;
        let req = RequestBody::new(subject, Value::Null);
        match ack {
            Some(reply) => Ok(Some(self.conn.issue(subject, reply, |rid| {
                OutboundFrame::Subscribe { req, rid: Some(rid) }
            }))),
            None => self
                .conn
                .transmit(&OutboundFrame::Subscribe { req, rid: None })
                .map(|()| None),
        }
    }

    /// Subscribe and wait for the acknowledgment.
    pub async fn subscribe_acked(&self, subject: &str) -> RpcResult<()> {
        check_subject(subject)?;
        let (reply, rx) = Reply::channel();
        let req = RequestBody::new(subject, Value::Null);
        let id = self.conn.issue(subject, reply, |rid| OutboundFrame::Subscribe {
            req,
            rid: Some(rid),
        });
        await_reply(&self.conn, id, rx).await.map(|_| ())
    }

    /// Correlated request. `callback` runs exactly once.
    pub fn request<F>(&self, subject: &str, data: Value, callback: F) -> CorrelationId
    where
        F: FnOnce(RpcResult<Value>) + Send + 'static,
    {
        self.request_with(subject, data, Reply::callback(callback))
    }

    /// Correlated request from an [`Invocation`].
    ///
    /// Fails with [`RpcError::MissingCallback`] before anything is sent if
    /// the invocation has no reply.
    pub fn request_invocation(&self, invocation: Invocation) -> RpcResult<CorrelationId> {
        invocation.validate()?;
        let (subject, data, reply) = invocation.into_parts();
        let reply = reply.ok_or(RpcError::MissingCallback { verb: "request" })?;
        Ok(self.request_with(&subject, data, reply))
    }

    /// Correlated request awaiting the result.
    pub async fn request_async(&self, subject: &str, data: Value) -> RpcResult<Value> {
        let (reply, rx) = Reply::channel();
        let id = self.request_with(subject, data, reply);
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

    fn request_with(&self, subject: &str, data: Value, reply: Reply) -> CorrelationId {
        self.conn.issue(subject, reply, |rid| OutboundFrame::RpcRequest {
            rid,
            req: RequestBody::new(subject, data),
        })
    }
}

fn check_subject(subject: &str) -> RpcResult<()> {
    if subject.is_empty() {
        return Err(RpcError::InvalidInvocation("empty subject".into()));
    }
    Ok(())
}
