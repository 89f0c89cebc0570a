//! Message envelopes exchanged with the transport.
//!
//! Every frame is a `(kind, payload)` pair. Outbound frames are built by the
//! adapters; inbound frames are decoded once here so routing never has to
//! sniff JSON shapes.

use crate::domain::correlation::CorrelationId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame kinds on the wire
pub mod kinds {
    /// Uncorrelated `{subject, data}` in either direction.
    pub const MESSAGE: &str = "message";
    /// Outbound correlated request `{rid, req}`.
    pub const RPC_REQUEST: &str = "rpc.req";
    /// Inbound answer to `rpc.req`.
    pub const RPC_RESPONSE: &str = "rpc::response";
    /// Publish `{req, rid?, ack}` in either direction.
    pub const PUBLISH: &str = "publish";
    /// Inbound acknowledgment of an outbound publish.
    pub const PUBLISH_RESPONSE: &str = "publish::response";
    /// Outbound subscribe `{req, rid?, ack}`.
    pub const SUBSCRIBE: &str = "subscribe";
    /// Inbound request from the remote side `{req, rid}`.
    pub const REQUEST: &str = "request";
    /// Generic response `{rid, error, data}` in either direction.
    pub const RESPONSE: &str = "response";
}

/// `{subject, data}` body shared by most frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    pub subject: String,
    #[serde(default)]
    pub data: Value,
}

impl RequestBody {
    pub fn new(subject: impl Into<String>, data: Value) -> Self {
        Self {
            subject: subject.into(),
            data,
        }
    }
}

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Fire-and-forget message.
    Message(RequestBody),
    /// Correlated request/response call.
    RpcRequest { rid: CorrelationId, req: RequestBody },
    /// Publish, acknowledged when `rid` is present.
    Publish {
        req: RequestBody,
        rid: Option<CorrelationId>,
    },
    /// Subscribe, acknowledged when `rid` is present.
    Subscribe {
        req: RequestBody,
        rid: Option<CorrelationId>,
    },
    /// Answer to an inbound `request`.
    Response {
        rid: Value,
        error: Option<Value>,
        data: Value,
    },
}

#[derive(Serialize)]
struct RpcRequestWire<'a> {
    rid: CorrelationId,
    req: &'a RequestBody,
}

#[derive(Serialize)]
struct PubSubWire<'a> {
    req: &'a RequestBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    rid: Option<CorrelationId>,
    ack: bool,
}

#[derive(Serialize)]
struct ResponseWire<'a> {
    rid: &'a Value,
    error: &'a Option<Value>,
    data: &'a Value,
}

impl OutboundFrame {
    /// Wire kind of this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => kinds::MESSAGE,
            Self::RpcRequest { .. } => kinds::RPC_REQUEST,
            Self::Publish { .. } => kinds::PUBLISH,
            Self::Subscribe { .. } => kinds::SUBSCRIBE,
            Self::Response { .. } => kinds::RESPONSE,
        }
    }

    /// Subject carried by this frame, if any.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::Message(req)
            | Self::RpcRequest { req, .. }
            | Self::Publish { req, .. }
            | Self::Subscribe { req, .. } => Some(&req.subject),
            Self::Response { .. } => None,
        }
    }

    /// JSON payload of this frame.
    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Message(req) => serde_json::to_value(req),
            Self::RpcRequest { rid, req } => serde_json::to_value(RpcRequestWire { rid: *rid, req }),
            Self::Publish { req, rid } | Self::Subscribe { req, rid } => {
                serde_json::to_value(PubSubWire {
                    req,
                    rid: *rid,
                    ack: rid.is_some(),
                })
            }
            Self::Response { rid, error, data } => {
                serde_json::to_value(ResponseWire { rid, error, data })
            }
        }
    }
}

/// Which inbound kind carried a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// `rpc::response`
    Rpc,
    /// `publish::response`
    Publish,
    /// `response`
    Generic,
}

/// Frames the client receives.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Uncorrelated message for subject handlers.
    Message { subject: String, data: Value },
    /// Answer to one of our correlated frames. `rid` is raw: it may be
    /// missing or not one of ours.
    Response {
        kind: ResponseKind,
        rid: Option<Value>,
        error: Option<Value>,
        data: Value,
    },
    /// Broadcast from the remote side.
    Publish { subject: String, data: Value },
    /// Request from the remote side expecting a `response`.
    Request {
        rid: Value,
        subject: String,
        data: Value,
    },
}

#[derive(Deserialize)]
struct ResponseIn {
    #[serde(default)]
    rid: Value,
    #[serde(default)]
    error: Value,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct PubSubIn {
    req: RequestBody,
    #[serde(default)]
    rid: Value,
}

fn non_null(v: Value) -> Option<Value> {
    (!v.is_null()).then_some(v)
}

impl InboundFrame {
    /// Decode a `(kind, payload)` pair received from the transport.
    pub fn decode(kind: &str, payload: Value) -> Result<Self, EnvelopeError> {
        let malformed = |source| EnvelopeError::Malformed {
            kind: kind.to_string(),
            source,
        };

        match kind {
            kinds::MESSAGE => {
                // Older servers put the subject in `op` and mean the whole
                // object as data.
                if let Some(op) = payload.get("op").and_then(Value::as_str) {
                    return Ok(Self::Message {
                        subject: op.to_string(),
                        data: payload,
                    });
                }
                let body: RequestBody = serde_json::from_value(payload).map_err(malformed)?;
                Ok(Self::Message {
                    subject: body.subject,
                    data: body.data,
                })
            }
            kinds::RPC_RESPONSE | kinds::PUBLISH_RESPONSE | kinds::RESPONSE => {
                let response_kind = match kind {
                    kinds::RPC_RESPONSE => ResponseKind::Rpc,
                    kinds::PUBLISH_RESPONSE => ResponseKind::Publish,
                    _ => ResponseKind::Generic,
                };
                let wire: ResponseIn = serde_json::from_value(payload).map_err(malformed)?;
                Ok(Self::Response {
                    kind: response_kind,
                    rid: non_null(wire.rid),
                    error: non_null(wire.error),
                    data: wire.data,
                })
            }
            kinds::PUBLISH => {
                let wire: PubSubIn = serde_json::from_value(payload).map_err(malformed)?;
                Ok(Self::Publish {
                    subject: wire.req.subject,
                    data: wire.req.data,
                })
            }
            kinds::REQUEST => {
                let wire: PubSubIn = serde_json::from_value(payload).map_err(malformed)?;
                let rid = non_null(wire.rid).ok_or_else(|| EnvelopeError::MissingField {
                    kind: kinds::REQUEST,
                    field: "rid",
                })?;
                Ok(Self::Request {
                    rid,
                    subject: wire.req.subject,
                    data: wire.req.data,
                })
            }
            other => Err(EnvelopeError::UnknownKind(other.to_string())),
        }
    }

    /// Wire kind this frame was decoded from.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => kinds::MESSAGE,
            Self::Response { kind, .. } => match kind {
                ResponseKind::Rpc => kinds::RPC_RESPONSE,
                ResponseKind::Publish => kinds::PUBLISH_RESPONSE,
                ResponseKind::Generic => kinds::RESPONSE,
            },
            Self::Publish { .. } => kinds::PUBLISH,
            Self::Request { .. } => kinds::REQUEST,
        }
    }
}

/// Inbound frames that could not be decoded. Logged and dropped.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("unknown frame kind: {0}")]
    UnknownKind(String),
    #[error("{kind} frame missing `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("malformed {kind} frame: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}
