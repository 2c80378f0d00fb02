//! WebAPI - HTTP Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP routes
//! - Request validation
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        camera_opened: state.hub.is_open(),
    })
}

/// Embedded viewer page
pub async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}
