//! Unauthenticated probes: liveness, readiness and the Prometheus scrape.

use super::state::AppState;
use crate::api::websocket::active_connection_count;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::warn;

/// Liveness body.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
}

/// `GET /health`: 200 while the process runs; never touches dependencies.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,
    /// Database connectivity (`true` when no database is configured)
    pub database: bool,
    /// Cache connectivity
    pub cache: bool,
    /// Open WebSocket connections
    pub websocket_connections: usize,
}

/// `GET /ready`: 200 when the database and cache answer, 503 otherwise.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let database = match &state.pool {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Database readiness check failed");
                false
            }
        },
        None => true,
    };

    let cache = state.service.deps().cache.backend().ping().await;
    if !cache {
        warn!("Cache readiness check failed");
    }

    let ready = database && cache;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            database,
            cache,
            websocket_connections: active_connection_count(),
        }),
    )
}

/// Prometheus scrape endpoint. 404 when no recorder is installed.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
