//! Outbound invocations and their single-use replies.

use crate::domain::error::{RpcError, RpcResult};
use serde_json::Value;
use std::fmt;
use tokio::sync::oneshot;

type Callback = Box<dyn FnOnce(RpcResult<Value>) + Send + 'static>;

/// Where the result of a correlated call goes.
///
/// [`Reply::complete`] takes `self`, so a reply cannot be completed twice.
pub enum Reply {
    /// Invoke a closure with the result.
    Callback(Callback),
    /// Send the result over a oneshot channel.
    Channel(oneshot::Sender<RpcResult<Value>>),
}

impl Reply {
    /// Wrap a closure.
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(RpcResult<Value>) + Send + 'static,
    {
        Self::Callback(Box::new(f))
    }

    /// Create a channel-backed reply and the receiver awaiting it.
    pub fn channel() -> (Self, oneshot::Receiver<RpcResult<Value>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Channel(tx), rx)
    }

    /// Deliver the result.
    ///
    /// Returns false if the receiving side of a channel reply was already gone.
    pub fn complete(self, result: RpcResult<Value>) -> bool {
        match self {
            Self::Callback(f) => {
                f(result);
                true
            }
            Self::Channel(tx) => tx.send(result).is_ok(),
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("Reply::Callback"),
            Self::Channel(_) => f.write_str("Reply::Channel"),
        }
    }
}

/// A validated outbound call: subject, optional data and optional reply.
///
/// Verbs that allow fire-and-forget treat a missing reply as "do not
/// correlate"; verbs that require one reject it before anything is sent.
#[derive(Debug)]
pub struct Invocation {
    subject: String,
    data: Value,
    reply: Option<Reply>,
}

impl Invocation {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            data: Value::Null,
            reply: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn with_reply(mut self, reply: Reply) -> Self {
        self.reply = Some(reply);
        self
    }

    /// Shorthand for `with_reply(Reply::callback(f))`.
    #[must_use]
    pub fn on_result<F>(self, f: F) -> Self
    where
        F: FnOnce(RpcResult<Value>) + Send + 'static,
    {
        self.with_reply(Reply::callback(f))
    }

    /// Accept the older object calling convention, where the subject lives in
    /// an `op` field and the whole object is the payload.
    pub fn from_legacy(message: Value) -> RpcResult<Self> {
        let subject = message
            .get("op")
            .and_then(Value::as_str)
            .filter(|op| !op.is_empty())
            .ok_or_else(|| RpcError::InvalidInvocation("legacy message without `op`".into()))?
            .to_string();

        Ok(Self {
            subject,
            data: message,
            reply: None,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn has_reply(&self) -> bool {
        self.reply.is_some()
    }

    pub(crate) fn validate(&self) -> RpcResult<()> {
        if self.subject.is_empty() {
            return Err(RpcError::InvalidInvocation("empty subject".into()));
        }
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (String, Value, Option<Reply>) {
        (self.subject, self.data, self.reply)
    }
}
