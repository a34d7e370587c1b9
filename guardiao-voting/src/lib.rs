//! Guardião voting service: community review of Discord reports.

use std::sync::Arc;

use axum::middleware::from_fn;
use axum::routing::{get, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use guardiao_shared::middleware::{metrics_middleware, AuthSecrets};

pub mod clients;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod status;
pub mod store;
pub mod voting;

use config::AppConfig;
use services::ModerationService;
use store::ReviewStore;

pub struct AppState<S: ReviewStore> {
    pub service: ModerationService<S>,
    pub config: AppConfig,
    pub metrics: Option<PrometheusHandle>,
}

impl<S: ReviewStore> AuthSecrets for AppState<S> {
    fn jwt_secret(&self) -> &str {
        &self.config.jwt_secret
    }

    fn internal_token(&self) -> &str {
        &self.config.internal_token
    }
}

pub fn router<S: ReviewStore>(state: Arc<AppState<S>>) -> Router {
    let internal = Router::new()
        .route("/reports", post(routes::internal_routes::file_report::<S>))
        .route("/guardians", post(routes::internal_routes::register_guardian::<S>));

    let sessions = Router::new()
        .route("/claim", post(routes::guardian_routes::claim_next::<S>))
        .route("/:id", get(routes::guardian_routes::get_session::<S>))
        .route("/:id/vote", post(routes::guardian_routes::cast_vote::<S>))
        .route("/:id/leave", post(routes::guardian_routes::leave_session::<S>));

    let admin = Router::new()
        .route("/reports", get(routes::admin_routes::list_reports::<S>))
        .route("/reports/:id", get(routes::admin_routes::get_report::<S>))
        .route("/reports/:id/priority", put(routes::admin_routes::set_priority::<S>))
        .route("/stats", get(routes::admin_routes::get_stats::<S>))
        .route("/sessions/sweep", post(routes::admin_routes::sweep_sessions::<S>));

    Router::new()
        .route("/health", get(routes::health::health_check::<S>))
        .route("/metrics", get(routes::health::metrics::<S>))
        .route("/guardians/me/status", put(routes::guardian_routes::set_status::<S>))
        .nest("/internal", internal)
        .nest("/sessions", sessions)
        .nest("/admin", admin)
        .layer(from_fn(metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the expiry sweep every `period` until the runtime shuts down.
pub fn spawn_sweeper<S: ReviewStore>(state: Arc<AppState<S>>, period: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = state.service.sweep_expired().await {
                tracing::error!(error = %e, "expired session sweep failed");
            }
        }
    });
}
