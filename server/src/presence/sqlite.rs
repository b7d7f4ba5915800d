//! SQLite-backed visitor store.
//!
//! Tables (see `db::migrations`):
//! - `visit_counter`: one row, `id = 1`, holding `total_visits`
//! - `visitor_sessions`: one row per visitor id with `last_seen_ms`
//!
//! Each method is a single statement, so SQLite's own atomicity covers the
//! concurrent join/increment cases.

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use crate::db::DbPool;
use crate::presence::store::{StoreError, VisitorStore};

#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&conn)?)
    }
}

impl VisitorStore for SqliteStore {
    fn total_visits(&self) -> Result<u64, StoreError> {
        let total: Option<i64> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT total_visits FROM visit_counter WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(total.unwrap_or(0).max(0) as u64)
    }

    fn increment_visits(&self) -> Result<u64, StoreError> {
        let total: i64 = self.with_conn(|conn| {
            conn.query_row(
                "INSERT INTO visit_counter (id, total_visits, updated_at)
                 VALUES (1, 1, datetime('now'))
                 ON CONFLICT(id) DO UPDATE SET
                     total_visits = total_visits + 1,
                     updated_at = datetime('now')
                 RETURNING total_visits",
                [],
                |row| row.get(0),
            )
        })?;
        Ok(total.max(0) as u64)
    }

    fn upsert_session(&self, visitor_id: &str, seen_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO visitor_sessions (visitor_id, last_seen_ms)
                 VALUES (?1, ?2)
                 ON CONFLICT(visitor_id) DO UPDATE SET last_seen_ms = excluded.last_seen_ms",
                rusqlite::params![visitor_id, seen_at.timestamp_millis()],
            )
        })?;
        Ok(())
    }

    fn remove_session(&self, visitor_id: &str) -> Result<bool, StoreError> {
        let deleted = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM visitor_sessions WHERE visitor_id = ?1",
                rusqlite::params![visitor_id],
            )
        })?;
        Ok(deleted > 0)
    }

    fn remove_stale_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM visitor_sessions WHERE last_seen_ms < ?1",
                rusqlite::params![cutoff.timestamp_millis()],
            )
        })
    }

    fn count_sessions(&self) -> Result<u64, StoreError> {
        let count: i64 = self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM visitor_sessions", [], |row| {
                row.get(0)
            })
        })?;
        Ok(count.max(0) as u64)
    }
}
