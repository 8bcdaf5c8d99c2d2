//! Health check endpoint for monitoring and readiness probes

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::api::routes::AppState;
use crate::storage::Repositories;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// "ok", or "unavailable" when the database cannot be reached
    #[schema(example = "ok")]
    pub status: String,
}

async fn check(repos: &Repositories) -> (StatusCode, Json<HealthResponse>) {
    match repos.check_health().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ok".to_string() })),
        Err(err) => {
            warn!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse { status: "unavailable".to_string() }),
            )
        }
    }
}

/// Health check endpoint
///
/// Returns 200 OK when the API server and its database are operational.
/// Unauthenticated and exempt from CSRF, for liveness probes and load
/// balancers.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    check(&state.repos).await
}
