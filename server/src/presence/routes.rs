use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::presence::request::{PresenceQuery, PresenceRequest};
use crate::state::AppState;

/// Body returned when the store cannot be reached. The zeros let the UI keep
/// rendering while the error field tells it to show a disconnected state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradedResponse {
    pub error: String,
    pub current_viewers: u64,
    pub total_visits: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl DegradedResponse {
    pub fn new(error: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            error: error.into(),
            current_viewers: 0,
            total_visits: 0,
            timestamp,
        }
    }
}

impl IntoResponse for DegradedResponse {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

/// GET|POST|DELETE /api/visitors?action=join|ping|leave|stats&visitorId=..&isPageLoad=..
///
/// Always answers with a snapshot. Unparseable query strings are treated
/// as a plain `stats` read.
pub async fn visitors(
    State(state): State<AppState>,
    query: Result<Query<PresenceQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(e) => {
            tracing::debug!("Unparseable visitors query, serving stats: {}", e);
            PresenceQuery::default()
        }
    };

    let request = PresenceRequest::from(query);
    let action = request.action_name();

    match state.tracker.handle(request).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => {
            tracing::error!("Visitor {} request failed: {}", action, e);
            DegradedResponse::new("Failed to update visitor stats", state.tracker.now())
                .into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub message: &'static str,
    pub removed: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// GET|POST /api/cleanup — scheduled reap, for an external cron.
/// Requires `Authorization: Bearer <cron_secret>`. Without a configured
/// secret the endpoint refuses every caller.
pub async fn cleanup(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !is_authorized(state.cron_secret.as_deref(), &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }

    match state.tracker.reap().await {
        Ok(removed) => {
            tracing::info!("Scheduled cleanup removed {} stale visitor sessions", removed);
            Json(CleanupResponse {
                message: "Cleanup completed",
                removed,
                timestamp: state.tracker.now(),
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!("Scheduled cleanup failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Cleanup failed",
                    "timestamp": state.tracker.now().timestamp_millis(),
                })),
            )
                .into_response()
        }
    }
}

fn is_authorized(secret: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return false;
    };

    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_matching_bearer_is_authorized() {
        assert!(is_authorized(Some("s3cret"), &bearer("s3cret")));
    }

    #[test]
    fn test_wrong_or_missing_token_is_rejected() {
        assert!(!is_authorized(Some("s3cret"), &bearer("nope")));
        assert!(!is_authorized(Some("s3cret"), &HeaderMap::new()));
    }

    #[test]
    fn test_unconfigured_secret_rejects_everyone() {
        assert!(!is_authorized(None, &bearer("")));
        assert!(!is_authorized(Some(""), &bearer("")));
    }

    #[test]
    fn test_degraded_body_shape() {
        let at = Utc::now();
        let body = serde_json::to_value(DegradedResponse::new("down", at)).unwrap();
        assert_eq!(body["error"], "down");
        assert_eq!(body["currentViewers"], 0);
        assert_eq!(body["totalVisits"], 0);
        assert_eq!(body["timestamp"], at.timestamp_millis());
    }
}
