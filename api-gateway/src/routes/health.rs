use axum::{Json, http::StatusCode};
use serde::Serialize;

/// Simple health-check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// `GET /health`
///
/// Returns a basic JSON document indicating liveness. Provider health is
/// deliberately not surfaced here; a degraded provider stack is not a
/// reason to take the service out of rotation.
pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}
