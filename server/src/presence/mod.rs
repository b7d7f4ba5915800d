//! Visitor presence tracking.
//!
//! Clients announce themselves with `join`, keep alive with `ping`, and drop
//! off with `leave`. Every call returns `{ currentViewers, totalVisits,
//! timestamp }`. Counts are best-effort: `isPageLoad` is trusted as sent and
//! sessions silent for longer than the staleness timeout are reaped.

pub mod clock;
pub mod request;
pub mod routes;
pub mod sqlite;
pub mod store;
pub mod sweeper;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use request::{PresenceQuery, PresenceRequest};
pub use sqlite::SqliteStore;
pub use store::{MemoryStore, StoreError, VisitorStore};
pub use tracker::{PresenceTracker, Snapshot, TrackerError, TrackerSettings};
