//! HTTP routes of the collector
//!
//! `POST /readings` accepts one reading per request:
//! - wrong or missing `x-api-key` → 403
//! - body missing any required field → 400
//! - nonce already stored → 400
//! - otherwise the reading is stored → 200

use crate::store::{ReadingStore, StoredReading};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, SecondsFormat};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thermolog_shared::wire;
use tracing::{debug, info, warn};

pub const MALFORMED: &str = "Malformed request - not all required fields provided";
pub const INVALID_VALUES: &str = "Malformed request - invalid field values";

#[derive(Clone)]
pub struct AppState {
    pub api_key: Arc<str>,
    pub store: Arc<ReadingStore>,
}

impl AppState {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: Arc::from(api_key),
            store: Arc::new(ReadingStore::new()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

type Reply = (StatusCode, Json<Message>);

fn reply(status: StatusCode, message: impl Into<String>) -> Reply {
    (
        status,
        Json(Message {
            message: message.into(),
        }),
    )
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/readings", post(ingest_reading).get(list_readings))
        .with_state(state)
}

/// Render a JSON scalar the way it appears in the payload
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// ISO-8601 UTC form of an epoch timestamp
pub fn iso_datetime(timestamp: i64) -> Option<String> {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn to_stored(fields: &Map<String, Value>) -> Option<StoredReading> {
    Some(StoredReading {
        id: scalar_text(&fields["nonce"]),
        datetime: iso_datetime(as_i64(&fields["timestamp"])?)?,
        temperature: as_f64(&fields["temperature"])?,
        sensor_id: scalar_text(&fields["sensor_id"]),
    })
}

async fn ingest_reading(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Reply {
    let key = headers
        .get(wire::API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if key != Some(&*state.api_key) {
        warn!("Rejected upload with missing or wrong API key");
        return reply(StatusCode::FORBIDDEN, "Forbidden");
    }

    let fields = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(fields)) => fields,
        _ => {
            warn!("Body is not a JSON object ({} bytes)", body.len());
            return reply(StatusCode::BAD_REQUEST, MALFORMED);
        }
    };
    debug!("Body={:?}", fields);

    if !wire::REQUIRED_FIELDS.iter().all(|f| fields.contains_key(*f)) {
        warn!("Malformed request as not all required fields are provided");
        return reply(StatusCode::BAD_REQUEST, MALFORMED);
    }

    let Some(reading) = to_stored(&fields) else {
        warn!("Unusable field values in {:?}", fields);
        return reply(StatusCode::BAD_REQUEST, INVALID_VALUES);
    };

    let nonce = reading.id.clone();
    let (temperature, sensor_id) = (reading.temperature, reading.sensor_id.clone());
    match state.store.insert(reading).await {
        Ok(()) => {
            info!(
                nonce = %nonce,
                sensor_id = %sensor_id,
                "Stored reading {:.2} ({} total)",
                temperature,
                state.store.len().await
            );
            reply(StatusCode::OK, "Stored")
        }
        Err(e) => {
            warn!("Nonce already seen {}", nonce);
            reply(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

async fn list_readings(State(state): State<AppState>) -> Json<Vec<StoredReading>> {
    Json(state.store.list().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    fn post_reading(key: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/readings")
            .header("content-type", wire::CONTENT_TYPE_JSON);
        if let Some(key) = key {
            builder = builder.header(wire::API_KEY_HEADER, key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    const VALID: &str = r#"{"temperature":59.62,"nonce":4242,"timestamp":100,"sensor_id":1}"#;

    #[tokio::test]
    async fn test_stores_valid_reading() {
        let state = AppState::new(KEY);
        let (status, _) = send(&state, post_reading(Some(KEY), VALID)).await;
        assert_eq!(status, StatusCode::OK);

        let stored = state.store.list().await;
        assert_eq!(
            stored,
            vec![StoredReading {
                id: "4242".into(),
                datetime: "1970-01-01T00:01:40Z".into(),
                temperature: 59.62,
                sensor_id: "1".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_wrong_key_forbidden() {
        let state = AppState::new(KEY);
        let (status, _) = send(&state, post_reading(Some("nope"), VALID)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&state, post_reading(None, VALID)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(state.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_missing_field_rejected() {
        let state = AppState::new(KEY);
        let body = r#"{"temperature":59.62,"timestamp":100,"sensor_id":1}"#;
        let (status, reply) = send(&state, post_reading(Some(KEY), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reply["message"], MALFORMED);

        let (status, _) = send(&state, post_reading(Some(KEY), "not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_replayed_nonce_rejected() {
        let state = AppState::new(KEY);
        let (status, _) = send(&state, post_reading(Some(KEY), VALID)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, reply) = send(&state, post_reading(Some(KEY), VALID)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reply["message"], "Item with nonce 4242 already seen");
        assert_eq!(state.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unusable_values_rejected() {
        let state = AppState::new(KEY);
        let body = r#"{"temperature":"warm","nonce":1,"timestamp":100,"sensor_id":1}"#;
        let (status, reply) = send(&state, post_reading(Some(KEY), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reply["message"], INVALID_VALUES);
    }

    #[tokio::test]
    async fn test_extra_fields_ignored() {
        let state = AppState::new(KEY);
        let body =
            r#"{"temperature":21,"nonce":"77","timestamp":"1700000000","sensor_id":3,"rssi":-60}"#;
        let (status, _) = send(&state, post_reading(Some(KEY), body)).await;
        assert_eq!(status, StatusCode::OK);

        let stored = &state.store.list().await[0];
        assert_eq!(stored.id, "77");
        assert_eq!(stored.datetime, "2023-11-14T22:13:20Z");
        assert_eq!(stored.sensor_id, "3");
    }

    #[tokio::test]
    async fn test_list_readings() {
        let state = AppState::new(KEY);
        send(&state, post_reading(Some(KEY), VALID)).await;

        let request = Request::builder()
            .uri("/readings")
            .body(Body::empty())
            .unwrap();
        let (status, listing) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing[0]["id"], "4242");
        assert_eq!(listing[0]["sensor_id"], "1");
        assert_eq!(listing.as_array().unwrap().len(), 1);
    }
}
