//! Common test utilities for the worker integration tests.
//!
//! Every test builds the health router over its own in-memory store.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use circles_worker::{app::create_app, config::Config};
use domain::services::PrecisionPolicy;
use persistence::{CirclesContext, MemoryStore, SharedStore};
use std::sync::Arc;
use tower::ServiceExt;

/// Test configuration from embedded defaults plus overrides.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    Config::load_for_test(overrides).expect("Failed to load test config")
}

/// Router plus a handle on the store behind it.
pub fn create_test_app() -> (Router, MemoryStore) {
    let store = MemoryStore::new();
    let shared: SharedStore = Arc::new(store.clone());
    let ctx = CirclesContext::new(shared, PrecisionPolicy::default());
    let app = create_app(Arc::new(test_config(&[])), ctx);
    (app, store)
}

/// Issues a GET and returns the status and parsed JSON body, if any.
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Option<serde_json::Value>) {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).ok())
}
