//! Pending Registry - correlation ids waiting for a response.
//!
//! Every entry leaves the registry through exactly one of three doors:
//! a matching response ([`PendingRegistry::resolve`]), the timeout sweep
//! ([`PendingRegistry::sweep_expired`]) or a disconnect
//! ([`PendingRegistry::drain_all`]). Removal happens under the lock and is
//! the serialization point: whoever removes an id completes its reply, the
//! others find it absent.
//!
//! Replies are completed after the lock is released, so a reply may call
//! straight back into the client.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::{RpcError, RpcResult};
use crate::domain::invocation::Reply;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A correlated call waiting for its result
struct PendingRequest {
    /// Where the result goes
    reply: Reply,
    /// When the call was registered
    issued_at: Instant,
    /// Subject (for logging)
    subject: String,
}

/// Counters for the pending registry
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total entries registered
    pub total_registered: AtomicU64,
    /// Total entries resolved by a response
    pub total_completed: AtomicU64,
    /// Total entries failed by the sweeper
    pub total_timeouts: AtomicU64,
    /// Total entries failed by a disconnect drain
    pub total_drained: AtomicU64,
    /// Responses whose id was not pending
    pub total_unknown: AtomicU64,
    /// Entries withdrawn, or whose receiver was gone at completion
    pub total_cancelled: AtomicU64,
}

/// Registry of in-flight correlated calls, owned by one connection.
#[derive(Default)]
pub struct PendingRegistry {
    pending: Mutex<HashMap<CorrelationId, PendingRequest>>,
    stats: PendingStats,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reply under `id`.
    ///
    /// If `id` is already pending the existing entry is left alone, the new
    /// reply is completed with [`RpcError::DuplicateCorrelationId`] and false
    /// is returned.
    pub fn register(&self, id: CorrelationId, subject: &str, reply: Reply) -> bool {
        let rejected = {
            let mut pending = self.pending.lock();
            if pending.contains_key(&id) {
                Some(reply)
            } else {
                pending.insert(
                    id,
                    PendingRequest {
                        reply,
                        issued_at: Instant::now(),
                        subject: subject.to_string(),
                    },
                );
                None
            }
        };

        if let Some(reply) = rejected {
            warn!(correlation_id = %id, subject = subject, "Correlation id already pending");
            reply.complete(Err(RpcError::DuplicateCorrelationId(id)));
            return false;
        }

        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        debug!(correlation_id = %id, subject = subject, "Registered pending request");
        true
    }

    /// Complete a pending request with its result.
    ///
    /// Returns false if `id` is not pending: a late response after a timeout,
    /// a duplicate, or a server-side retransmit. That is logged and otherwise
    /// ignored.
    pub fn resolve(&self, id: CorrelationId, result: RpcResult<Value>) -> bool {
        let Some(entry) = self.pending.lock().remove(&id) else {
            self.stats.total_unknown.fetch_add(1, Ordering::Relaxed);
            warn!(
                correlation_id = %id,
                "Response for unknown correlation id (late reply or server-side retransmit?)"
            );
            return false;
        };

        let elapsed = entry.issued_at.elapsed();
        if entry.reply.complete(result) {
            self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = %id,
                subject = %entry.subject,
                response_time_ms = elapsed.as_millis(),
                "Completed pending request"
            );
        } else {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = %id,
                subject = %entry.subject,
                "Pending request receiver dropped"
            );
        }
        true
    }

    /// Fail every entry older than `timeout` with [`RpcError::Timeout`].
    ///
    /// Returns the ids that were failed.
    pub fn sweep_expired(&self, now: Instant, timeout: Duration) -> Vec<CorrelationId> {
        let expired: Vec<(CorrelationId, PendingRequest)> = {
            let mut pending = self.pending.lock();
            let victims: Vec<CorrelationId> = pending
                .iter()
                .filter(|(_, req)| now.saturating_duration_since(req.issued_at) > timeout)
                .map(|(id, _)| *id)
                .collect();
            victims
                .into_iter()
                .filter_map(|id| pending.remove(&id).map(|req| (id, req)))
                .collect()
        };

        let mut failed = Vec::with_capacity(expired.len());
        for (id, req) in expired {
            warn!(
                correlation_id = %id,
                subject = %req.subject,
                elapsed_ms = now.saturating_duration_since(req.issued_at).as_millis(),
                timeout_ms = timeout.as_millis(),
                "Pending request timed out"
            );
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
            req.reply.complete(Err(RpcError::Timeout(timeout)));
            failed.push(id);
        }
        failed
    }

    /// Fail every entry with [`RpcError::ConnectionClosed`] and empty the
    /// registry. Returns the number of entries drained.
    pub fn drain_all(&self, reason: &str) -> usize {
        let drained = std::mem::take(&mut *self.pending.lock());
        let count = drained.len();
        if count > 0 {
            warn!(count = count, reason = reason, "Draining pending requests");
        }

        for (id, req) in drained {
            debug!(correlation_id = %id, subject = %req.subject, "Pending request drained");
            req.reply.complete(Err(RpcError::ConnectionClosed));
        }
        self.stats
            .total_drained
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Withdraw an entry without completing it.
    ///
    /// Used when the waiting side has gone away on its own.
    pub fn cancel(&self, id: &CorrelationId) -> bool {
        if self.pending.lock().remove(id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Number of entries currently pending
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Check if a correlation id is pending
    pub fn is_pending(&self, id: &CorrelationId) -> bool {
        self.pending.lock().contains_key(id)
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}
