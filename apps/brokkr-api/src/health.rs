//! Kubernetes-style health probes.
//!
//! `/healthz` answers as soon as the process serves requests. `/readyz`
//! additionally pings the storage backend, so a broker with a lost
//! database connection is pulled out of rotation instead of failing
//! logins one by one.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use brokkr_sso::SsoState;
use serde::Serialize;
use utoipa::ToSchema;

/// Liveness probe body.
#[derive(Debug, Serialize, ToSchema)]
pub struct LivenessResponse {
    /// Always "ok" while the process is running.
    pub status: &'static str,
}

/// Readiness probe body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessResponse {
    /// "ready" or "unavailable".
    pub status: &'static str,
    /// Storage backend check outcome: "ok" or "error".
    pub storage: &'static str,
}

/// Liveness probe. Returns 200 while the process is up.
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Process is alive", body = LivenessResponse),
    ),
    tag = "Health"
)]
pub async fn healthz_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "ok" })
}

/// Readiness probe. Pings the storage backend; 503 pulls the instance
/// out of the load balancer rotation.
#[utoipa::path(
    get,
    path = "/readyz",
    responses(
        (status = 200, description = "Storage reachable", body = ReadinessResponse),
        (status = 503, description = "Storage unreachable", body = ReadinessResponse),
    ),
    tag = "Health"
)]
pub async fn readyz_handler(
    State(state): State<SsoState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                storage: "ok",
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed: storage ping error");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "unavailable",
                    storage: "error",
                }),
            )
        }
    }
}
