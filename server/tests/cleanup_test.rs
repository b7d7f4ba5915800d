//! Integration tests for the scheduled cleanup endpoint.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::net::TcpListener;

use visitors_server::presence::{
    Clock, ManualClock, MemoryStore, PresenceTracker, TrackerSettings, VisitorStore,
};

async fn start_test_server(
    cron_secret: Option<&str>,
) -> (String, Arc<MemoryStore>, Arc<ManualClock>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let tracker = Arc::new(PresenceTracker::new(
        store.clone(),
        clock.clone(),
        TrackerSettings::default(),
    ));

    let state = visitors_server::state::AppState {
        tracker,
        cron_secret: cron_secret.map(String::from),
    };

    let app = visitors_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), store, clock)
}

#[tokio::test]
async fn test_cleanup_requires_bearer_secret() {
    let (base_url, _store, _clock) = start_test_server(Some("cron-s3cret")).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/cleanup", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Unauthorized");

    let resp = client
        .post(format!("{}/api/cleanup", base_url))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_cleanup_disabled_without_secret() {
    let (base_url, _store, _clock) = start_test_server(None).await;

    let resp = reqwest::Client::new()
        .get(format!("{}/api/cleanup", base_url))
        .bearer_auth("")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_cleanup_reaps_stale_sessions() {
    let (base_url, store, clock) = start_test_server(Some("cron-s3cret")).await;

    store
        .upsert_session("stale-1", clock.now() - Duration::minutes(5))
        .unwrap();
    store
        .upsert_session("stale-2", clock.now() - Duration::minutes(3))
        .unwrap();
    store.upsert_session("live", clock.now()).unwrap();

    let resp = reqwest::Client::new()
        .get(format!("{}/api/cleanup", base_url))
        .bearer_auth("cron-s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Cleanup completed");
    assert_eq!(body["removed"], 2);
    assert_eq!(body["timestamp"].as_i64().unwrap(), clock.now().timestamp_millis());
    assert_eq!(store.count_sessions().unwrap(), 1);
}
