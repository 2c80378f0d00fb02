//! API Routes

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::camera_control;
use crate::error::Result;
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(super::index))
        .route("/stream", get(stream))
        .route("/health", get(super::health_check))
        .route("/api/controls", get(get_controls))
        .route("/api/controls", post(set_controls))
        .with_state(state)
}

/// Live MJPEG stream. Each connection gets its own subscription to the
/// capture hub; the response body runs until the client disconnects.
async fn stream(State(state): State<AppState>) -> impl IntoResponse {
    tracing::debug!(
        viewers = state.hub.subscriber_count() + 1,
        "Viewer attached to stream"
    );
    state.hub.stream_response()
}

/// List device controls via the control utility
async fn get_controls() -> Result<impl IntoResponse> {
    let report = camera_control::list_controls().await?;
    Ok(Json(report))
}

/// Apply control values from the request body.
///
/// Responds 200 when every requested control applied cleanly, 400 when any
/// failed; the body maps each control to its `{ok, out}` outcome either way.
async fn set_controls(payload: Option<Json<Value>>) -> impl IntoResponse {
    let payload = payload.map(|Json(v)| v).unwrap_or_else(|| json!({}));
    let map = payload.as_object().cloned().unwrap_or_default();

    let (all_ok, results) = camera_control::apply_controls(&map).await;
    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    (status, Json(json!(results)))
}
