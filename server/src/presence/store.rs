//! Persistence seam for visitor sessions and the visit counter.
//!
//! The tracker never keeps authoritative state of its own: every request goes
//! through a [`VisitorStore`]. Implementations must make each method atomic on
//! its own (upsert, increment, range delete); nothing above them takes locks.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage backend for visitor presence.
pub trait VisitorStore: Send + Sync {
    /// Current value of the total-visit counter (0 when never incremented).
    fn total_visits(&self) -> Result<u64, StoreError>;

    /// Atomically add one visit and return the new total.
    fn increment_visits(&self) -> Result<u64, StoreError>;

    /// Insert the session or refresh its `last_seen`. Last write wins.
    fn upsert_session(&self, visitor_id: &str, seen_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Delete one session. Returns whether a row existed.
    fn remove_session(&self, visitor_id: &str) -> Result<bool, StoreError>;

    /// Delete every session last seen strictly before `cutoff`.
    /// Returns the number of sessions removed.
    fn remove_stale_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Number of sessions currently stored.
    fn count_sessions(&self) -> Result<u64, StoreError>;
}

/// Non-durable backend: state lives for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: DashMap<String, DateTime<Utc>>,
    total_visits: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VisitorStore for MemoryStore {
    fn total_visits(&self) -> Result<u64, StoreError> {
        Ok(self.total_visits.load(Ordering::SeqCst))
    }

    fn increment_visits(&self) -> Result<u64, StoreError> {
        Ok(self.total_visits.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn upsert_session(&self, visitor_id: &str, seen_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.sessions.insert(visitor_id.to_string(), seen_at);
        Ok(())
    }

    fn remove_session(&self, visitor_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.remove(visitor_id).is_some())
    }

    fn remove_stale_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| *entry.value() < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        // Re-check under the shard lock: a ping may have refreshed the entry meanwhile
        let removed = stale
            .iter()
            .filter(|id| {
                self.sessions
                    .remove_if(id.as_str(), |_, seen| *seen < cutoff)
                    .is_some()
            })
            .count();

        Ok(removed)
    }

    fn count_sessions(&self) -> Result<u64, StoreError> {
        Ok(self.sessions.len() as u64)
    }
}
