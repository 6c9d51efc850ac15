use crate::server::{Readiness, ServerRouter, json::Json};
use axum::{Router, extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Serialize;

pub fn routes() -> ServerRouter {
    Router::new().typed_get(health)
}

#[derive(TypedPath)]
#[typed_path("/health")]
struct HealthPath;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
enum HealthStatus {
    Ready,
    Connecting,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct HealthResponse {
    status: HealthStatus,
}

/// 503 until the consumer has subscribed, and again while it reconnects.
#[axum::debug_handler(state = crate::server::ServerState)]
async fn health(
    _: HealthPath,
    State(readiness): State<Readiness>,
) -> (StatusCode, Json<HealthResponse>) {
    if readiness.is_ready() {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: HealthStatus::Ready,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: HealthStatus::Connecting,
            }),
        )
    }
}
