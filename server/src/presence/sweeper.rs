//! Background sweep of stale visitor sessions.
//!
//! Inline reaping already keeps snapshots honest; the sweeper keeps the
//! sessions table small when nobody is asking for stats.

use std::sync::Arc;
use std::time::Duration;

use crate::presence::tracker::PresenceTracker;

/// Spawn a task that reaps stale sessions every `interval`.
/// A zero interval disables the sweeper.
pub fn spawn_sweeper(tracker: Arc<PresenceTracker>, interval: Duration) {
    if interval.is_zero() {
        tracing::info!("Visitor session sweeper disabled");
        return;
    }

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match tracker.reap().await {
                Ok(0) => tracing::debug!("Visitor sweep: no stale sessions"),
                Ok(count) => {
                    tracing::info!("Visitor sweep: removed {} stale sessions", count)
                }
                Err(e) => tracing::error!("Visitor sweep error: {}", e),
            }
        }
    });
}
