use axum::{middleware, routing::get, Router};
use persistence::CirclesContext;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::health;

#[derive(Clone)]
pub struct AppState {
    pub ctx: CirclesContext,
    pub config: Arc<Config>,
}

/// Health router: health, liveness, readiness and metrics.
pub fn create_app(config: Arc<Config>, ctx: CirclesContext) -> Router {
    let timeout = Duration::from_secs(config.server.request_timeout_secs);
    let state = AppState { ctx, config };

    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/metrics", get(metrics_handler))
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .with_state(state)
}
