use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking — no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: Visitor tracking

-- Single-row counter; id is pinned to 1
CREATE TABLE visit_counter (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    total_visits INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- last_seen_ms is Unix epoch milliseconds so stale rows can be range-deleted
CREATE TABLE visitor_sessions (
    visitor_id TEXT PRIMARY KEY,
    last_seen_ms INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_visitor_sessions_last_seen ON visitor_sessions(last_seen_ms);
",
        ),
    ])
}
