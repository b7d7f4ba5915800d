//! The presence tracker: a stateless request handler over a [`VisitorStore`].
//!
//! Each call mutates the store according to its [`PresenceRequest`], reaps
//! stale sessions, then reads back a [`Snapshot`]. Store calls run on the
//! blocking pool, bounded by a timeout and retried with exponential backoff.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::presence::clock::Clock;
use crate::presence::request::PresenceRequest;
use crate::presence::store::{StoreError, VisitorStore};

/// What every tracker call returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub current_viewers: u64,
    pub total_visits: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("{op} failed: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("{op} timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },

    #[error("{op} worker failed: {source}")]
    Worker {
        op: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// Sessions not refreshed within this window are reaped.
    pub staleness_timeout: Duration,
    /// Minimum gap between reaps done inline with requests. Zero reaps on
    /// every call. Never larger than `staleness_timeout`.
    pub reap_interval: Duration,
    /// Upper bound on a single store call.
    pub store_timeout: Duration,
    /// Total tries per store call, including the first.
    pub store_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            staleness_timeout: Duration::from_secs(120),
            reap_interval: Duration::ZERO,
            store_timeout: Duration::from_millis(2000),
            store_attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

const NEVER_REAPED: i64 = i64::MIN;

pub struct PresenceTracker {
    store: Arc<dyn VisitorStore>,
    clock: Arc<dyn Clock>,
    settings: TrackerSettings,
    /// Epoch millis of the last inline reap. Only used for rate limiting.
    last_reap_ms: AtomicI64,
}

impl PresenceTracker {
    pub fn new(
        store: Arc<dyn VisitorStore>,
        clock: Arc<dyn Clock>,
        mut settings: TrackerSettings,
    ) -> Self {
        if settings.reap_interval > settings.staleness_timeout {
            tracing::warn!(
                "Reap interval {:?} exceeds staleness timeout {:?}, clamping",
                settings.reap_interval,
                settings.staleness_timeout
            );
            settings.reap_interval = settings.staleness_timeout;
        }
        settings.store_attempts = settings.store_attempts.max(1);

        Self {
            store,
            clock,
            settings,
            last_reap_ms: AtomicI64::new(NEVER_REAPED),
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Apply one request and return the resulting snapshot.
    pub async fn handle(&self, request: PresenceRequest) -> Result<Snapshot, TrackerError> {
        let now = self.clock.now();
        tracing::debug!("Presence {} at {}", request.action_name(), now);

        match request {
            PresenceRequest::Join {
                visitor_id,
                page_load,
            } => {
                self.call("upsert_session", true, move |store| {
                    store.upsert_session(&visitor_id, now)
                })
                .await?;
                if page_load {
                    self.call("increment_visits", false, |store| store.increment_visits())
                        .await?;
                }
            }
            PresenceRequest::Ping { visitor_id } => {
                self.call("upsert_session", true, move |store| {
                    store.upsert_session(&visitor_id, now)
                })
                .await?;
            }
            PresenceRequest::Leave { visitor_id } => {
                self.call("remove_session", true, move |store| {
                    store.remove_session(&visitor_id)
                })
                .await?;
            }
            PresenceRequest::Stats => {}
        }

        self.snapshot(now).await
    }

    /// Reap stale sessions now, regardless of the inline rate limit.
    /// Returns how many sessions were removed.
    pub async fn reap(&self) -> Result<usize, TrackerError> {
        let now = self.clock.now();
        let removed = self.reap_before(now).await?;
        self.last_reap_ms
            .fetch_max(now.timestamp_millis(), Ordering::SeqCst);
        Ok(removed)
    }

    async fn snapshot(&self, now: DateTime<Utc>) -> Result<Snapshot, TrackerError> {
        if let Some(previous) = self.claim_inline_reap(now) {
            match self.reap_before(now).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!("Reaped {} stale visitor sessions", removed),
                Err(e) => {
                    // Hand the slot back so the next request reaps instead of
                    // waiting out a full interval
                    let _ = self.last_reap_ms.compare_exchange(
                        now.timestamp_millis(),
                        previous,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    );
                    return Err(e);
                }
            }
        }

        let current_viewers = self
            .call("count_sessions", true, |store| store.count_sessions())
            .await?;
        let total_visits = self
            .call("total_visits", true, |store| store.total_visits())
            .await?;

        Ok(Snapshot {
            current_viewers,
            total_visits,
            timestamp: now,
        })
    }

    async fn reap_before(&self, now: DateTime<Utc>) -> Result<usize, TrackerError> {
        let cutoff = now
            .checked_sub_signed(chrono_duration(self.settings.staleness_timeout))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.call("remove_stale_sessions", true, move |store| {
            store.remove_stale_sessions(cutoff)
        })
        .await
    }

    /// Decide whether this request performs the inline reap.
    /// Concurrent requests race on a compare-exchange so only one of them reaps
    /// per interval. Returns the previous slot value when claimed, so a failed
    /// reap can release it.
    fn claim_inline_reap(&self, now: DateTime<Utc>) -> Option<i64> {
        let now_ms = now.timestamp_millis();
        let last = self.last_reap_ms.load(Ordering::SeqCst);

        if self.settings.reap_interval.is_zero() {
            return Some(last);
        }

        let interval_ms = self.settings.reap_interval.as_millis() as i64;
        if last != NEVER_REAPED && now_ms.saturating_sub(last) < interval_ms {
            return None;
        }

        self.last_reap_ms
            .compare_exchange(last, now_ms, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
    }

    /// Run one store operation on the blocking pool with timeout and retries.
    ///
    /// A non-idempotent operation is not retried after a timeout, since the
    /// abandoned attempt may still commit.
    async fn call<T, F>(&self, op: &'static str, idempotent: bool, f: F) -> Result<T, TrackerError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn VisitorStore) -> Result<T, StoreError> + Clone + Send + 'static,
    {
        let attempts = self.settings.store_attempts;
        let mut backoff = self.settings.retry_backoff;
        let mut attempt = 1;

        loop {
            let store = self.store.clone();
            let f = f.clone();
            let outcome = tokio::time::timeout(
                self.settings.store_timeout,
                tokio::task::spawn_blocking(move || f(store.as_ref())),
            )
            .await;

            let err = match outcome {
                Ok(Ok(Ok(value))) => return Ok(value),
                Ok(Ok(Err(source))) => TrackerError::Store { op, source },
                Ok(Err(source)) => TrackerError::Worker { op, source },
                Err(_) => {
                    let err = TrackerError::Timeout {
                        op,
                        timeout_ms: self.settings.store_timeout.as_millis() as u64,
                    };
                    if !idempotent {
                        return Err(err);
                    }
                    err
                }
            };

            if attempt >= attempts {
                return Err(err);
            }

            tracing::warn!(
                "Store call {} attempt {}/{} failed: {}, retrying in {:?}",
                op,
                attempt,
                attempts,
                err,
                backoff
            );
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
            attempt += 1;
        }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}
