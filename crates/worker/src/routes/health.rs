//! Health check endpoint handlers.

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::warn;

use crate::app::AppState;
use crate::error::ApiError;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: StoreHealth,
}

/// Document store reachability.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreHealth {
    pub backend: String,
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// Simple status response for liveness and readiness checks.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Full health check: pings the store and reports the round trip.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let backend = format!("{:?}", state.config.store.backend).to_lowercase();
    match state.ctx.ping().await {
        Ok(latency) => Ok(Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store: StoreHealth {
                backend,
                connected: true,
                latency_ms: Some(latency.as_millis() as u64),
            },
        })),
        Err(e) => {
            warn!(error = %e, "Store health check failed");
            Err(ApiError::ServiceUnavailable(format!("{} store unreachable", backend)))
        }
    }
}

/// Liveness check: the process is running.
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive".to_string(),
    })
}

/// Readiness check: the store answers.
pub async fn ready(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    state.ctx.ping().await?;
    Ok(Json(StatusResponse {
        status: "ready".to_string(),
    }))
}
