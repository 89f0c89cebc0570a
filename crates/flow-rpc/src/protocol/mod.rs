//! Protocol adapters over a shared [`Connection`](crate::connection::Connection).
//!
//! Each adapter supplies the outbound verbs and an inbound router; the
//! connection supplies the registry, the transport and the lifecycle.

pub mod messaging;
pub mod rpc;

pub use messaging::MessagingClient;
pub use rpc::RpcClient;

use crate::connection::Connection;
use crate::domain::correlation::CorrelationId;
use crate::domain::error::{RpcError, RpcResult};
use crate::domain::pending::PendingRegistry;
use serde_json::Value;
use tokio::sync::oneshot;

/// Withdraws the pending entry if the awaiting future is dropped first.
struct PendingGuard<'a> {
    pending: &'a PendingRegistry,
    id: CorrelationId,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pending.cancel(&self.id);
        }
    }
}

/// Wait for the reply registered under `id`.
pub(crate) async fn await_reply(
    conn: &Connection,
    id: CorrelationId,
    rx: oneshot::Receiver<RpcResult<Value>>,
) -> RpcResult<Value> {
    let mut guard = PendingGuard {
        pending: conn.pending(),
        id,
        armed: true,
    };
    let result = rx.await.unwrap_or(Err(RpcError::Canceled));
    guard.armed = false;
    result
}
