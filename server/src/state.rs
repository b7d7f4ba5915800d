use std::sync::Arc;

use crate::presence::PresenceTracker;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Presence tracker over the configured visitor store
    pub tracker: Arc<PresenceTracker>,
    /// Bearer secret for the scheduled cleanup endpoint; `None` disables it
    pub cron_secret: Option<String>,
}
