//! Timeout Sweeper - fails pending requests the transport never answers.

use crate::domain::pending::PendingRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Background task that sweeps `pending` every `period`.
///
/// Runs until aborted. Missed ticks are skipped rather than replayed, so a
/// stalled runtime does not produce a burst of sweeps.
pub async fn sweep_task(pending: Arc<PendingRegistry>, period: Duration, timeout: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let expired = pending.sweep_expired(Instant::now(), timeout);
        if !expired.is_empty() {
            debug!(expired = expired.len(), "Swept expired pending requests");
        }
    }
}

/// Spawn [`sweep_task`] on the current runtime.
pub fn spawn_sweeper(
    pending: Arc<PendingRegistry>,
    period: Duration,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(sweep_task(pending, period, timeout))
}
