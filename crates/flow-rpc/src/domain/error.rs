//! Error types delivered through replies and returned by the client API.

use crate::domain::correlation::CorrelationId;
use serde_json::Value;
use std::time::Duration;

/// Outcome of a correlated call that did not produce data.
///
/// Every correlation failure travels through the same reply a success would
/// have used; only [`RpcError::MissingCallback`] and
/// [`RpcError::InvalidInvocation`] are returned synchronously.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    /// No response arrived within the configured timeout.
    #[error("request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The connection dropped while the request was pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// The remote side answered with an error value.
    #[error("remote error: {0}")]
    Remote(Value),

    /// A verb that requires a result handler was invoked without one.
    #[error("{verb}() requires a result callback")]
    MissingCallback { verb: &'static str },

    /// The transport refused an outbound frame.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport could not be opened.
    #[error("transport connect error: {0}")]
    TransportConnect(String),

    /// The id generator produced an id that is still pending.
    #[error("duplicate correlation id: {0}")]
    DuplicateCorrelationId(CorrelationId),

    /// The waiting side went away before a result was produced.
    #[error("request canceled")]
    Canceled,

    /// An invocation could not be validated.
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),

    /// An outbound frame could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),
}

impl RpcError {
    /// True for the error produced by the timeout sweeper.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// True for the error produced by a disconnect drain.
    #[must_use]
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encode(e.to_string())
    }
}

/// Result type for correlated calls
pub type RpcResult<T> = Result<T, RpcError>;
