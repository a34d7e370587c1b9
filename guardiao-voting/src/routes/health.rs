use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use guardiao_shared::types::api::{HealthCheck, HealthResponse};

use crate::store::ReviewStore;
use crate::AppState;

pub async fn health_check<S: ReviewStore>(State(state): State<Arc<AppState<S>>>) -> Json<HealthResponse> {
    let store = match state.service.ping().await {
        Ok(()) => HealthCheck::healthy("store"),
        Err(e) => HealthCheck::unhealthy("store", e.to_string()),
    };
    Json(HealthResponse::healthy("guardiao-voting", env!("CARGO_PKG_VERSION")).with_checks(vec![store]))
}

pub async fn metrics<S: ReviewStore>(State(state): State<Arc<AppState<S>>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}
