//! HTTP route definitions
//!
//! The development relay speaks the same REST dialect as the hosted store:
//! `{path}.json` with `GET`, `PUT`, `PATCH` and `DELETE`, plus event-stream
//! subscriptions on `GET` with `Accept: text/event-stream`.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    middleware,
    routing::get,
    Router,
};
use futures::stream::{self, Stream};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::debug;

use crate::app::AppState;
use crate::http::middleware::require_token;
use crate::relay::{RelayError, RelayPath, RelayStore, Subscription};
use crate::util::time::uptime_secs;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE]);

    // Public routes (no token required)
    let public_routes = Router::new().route("/health", get(health_handler));

    // Relay tree, guarded by `?auth=` when a token is configured
    let relay_routes = Router::new()
        .route(
            "/*path",
            get(read_handler)
                .put(set_handler)
                .patch(update_handler)
                .delete(delete_handler),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .merge(public_routes)
        .merge(relay_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    subscribers: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        subscribers: state.relay.subscriber_count(),
    })
}

// ============================================================================
// Relay endpoints
// ============================================================================

/// `players/1.json` -> `players/1`
fn relay_path(raw: &str) -> Result<RelayPath, AppError> {
    let raw = raw.strip_suffix(".json").unwrap_or(raw);
    RelayPath::parse(raw).map_err(AppError::from)
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

async fn read_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let path = relay_path(&raw)?;

    if wants_event_stream(&headers) {
        debug!(path = %path, "Opening relay event stream");
        let stream = event_stream(state.relay.subscribe(&path));
        let keep_alive = KeepAlive::new()
            .interval(Duration::from_secs(30))
            .event(Event::default().event("keep-alive").data("null"));
        return Ok(Sse::new(stream).keep_alive(keep_alive).into_response());
    }

    Ok(Json(state.relay.get(&path).unwrap_or(Value::Null)).into_response())
}

/// Every delivery becomes a root `put`, so clients rebuild the full value
fn event_stream(rx: Subscription) -> impl Stream<Item = Result<Event, axum::Error>> {
    stream::unfold(rx, |mut rx| async move {
        let value = rx.recv().await?;
        let event = Event::default()
            .event("put")
            .json_data(json!({ "path": "/", "data": value }));
        Some((event, rx))
    })
}

async fn set_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let path = relay_path(&raw)?;
    state.relay.set(&path, value.clone());
    Ok(Json(value))
}

async fn update_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let path = relay_path(&raw)?;
    if !value.is_object() {
        return Err(AppError::BadRequest(
            "PATCH body must be a JSON object".to_string(),
        ));
    }
    state.relay.update(&path, value.clone());
    Ok(Json(value))
}

async fn delete_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<Value>, AppError> {
    let path = relay_path(&raw)?;
    state.relay.delete(&path);
    Ok(Json(Value::Null))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<RelayError> for AppError {
    fn from(e: RelayError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use futures::StreamExt;
    use tower::ServiceExt;

    fn state() -> AppState {
        let config = Config::from_lookup(|_| None).unwrap();
        AppState::new(config)
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = build_router(state())
            .oneshot(request(Method::GET, "/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], json!("ok"));
    }

    #[tokio::test]
    async fn put_patch_get_delete_round_trip() {
        let state = state();
        let router = build_router(state.clone());

        let put = router
            .clone()
            .oneshot(request(
                Method::PUT,
                "/players/1/currentImpulse.json",
                Some(json!({"x": 1.0, "y": 0.0, "z": 0.0})),
            ))
            .await
            .unwrap();
        assert_eq!(put.status(), StatusCode::OK);

        router
            .clone()
            .oneshot(request(
                Method::PATCH,
                "/players/1.json",
                Some(json!({"deviceID": 1})),
            ))
            .await
            .unwrap();

        let get = router
            .clone()
            .oneshot(request(Method::GET, "/players/1.json", None))
            .await
            .unwrap();
        let record = json_body(get).await;
        assert_eq!(record["deviceID"], json!(1));
        assert_eq!(record["currentImpulse"]["x"], json!(1.0));

        router
            .clone()
            .oneshot(request(Method::DELETE, "/players/1.json", None))
            .await
            .unwrap();
        assert!(state.relay.get(&RelayPath::players()).is_none());

        let missing = router
            .oneshot(request(Method::GET, "/players.json", None))
            .await
            .unwrap();
        assert_eq!(json_body(missing).await, Value::Null);
    }

    #[tokio::test]
    async fn forbidden_key_characters_are_rejected() {
        let response = build_router(state())
            .oneshot(request(Method::PUT, "/players/a$b.json", Some(json!(1))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn event_stream_starts_with_current_value() {
        let state = state();
        let peer = RelayPath::player(crate::relay::protocol::DeviceId(3));
        state.relay.set(&peer, json!({"deviceID": 3}));

        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .uri("/players.json")
                    .header(header::ACCEPT, "text/event-stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        let text = String::from_utf8_lossy(&first);
        assert!(text.contains("event: put"));
        assert!(text.contains("\"deviceID\":3"));
    }

    #[tokio::test]
    async fn configured_token_guards_the_relay_tree() {
        let token = |key: &str| (key == "RELAY_AUTH").then(|| "s3cret".to_string());
        let router = build_router(AppState::new(Config::from_lookup(token).unwrap()));

        let missing = router
            .clone()
            .oneshot(request(Method::GET, "/players.json", None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = router
            .clone()
            .oneshot(request(Method::GET, "/players.json?auth=nope", None))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let allowed = router
            .clone()
            .oneshot(request(Method::GET, "/players.json?auth=s3cret", None))
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        let health = router
            .oneshot(request(Method::GET, "/health", None))
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }
}
