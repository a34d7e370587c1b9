use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use guardiao_shared::errors::{AppError, AppResult, ErrorCode};
use guardiao_shared::middleware::AdminUser;
use guardiao_shared::types::api::ApiResponse;
use guardiao_shared::types::pagination::{Paginated, PaginationParams};

use crate::models::{QueueEntry, Report};
use crate::services::moderation_service::{DashboardStats, ReportDetails};
use crate::status::ReportStatus;
use crate::store::ReviewStore;
use crate::AppState;

// --- Request / Response types ---

#[derive(Debug, Deserialize)]
pub struct ReportFilterParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    pub status: Option<ReportStatus>,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 20 }

impl ReportFilterParams {
    fn pagination(&self) -> PaginationParams {
        PaginationParams::new(self.page, self.per_page)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct PriorityRequest {
    #[validate(range(min = -100, max = 100))]
    pub priority: i32,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub cancelled_sessions: usize,
}

// --- Handlers ---

pub async fn list_reports<S: ReviewStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Query(params): Query<ReportFilterParams>,
) -> AppResult<Json<ApiResponse<Paginated<Report>>>> {
    let page = state
        .service
        .list_reports(params.status, params.pagination())
        .await?;
    Ok(Json(ApiResponse::ok(page)))
}

pub async fn get_report<S: ReviewStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(report_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ReportDetails>>> {
    let details = state.service.report_details(report_id).await?;
    Ok(Json(ApiResponse::ok(details)))
}

pub async fn set_priority<S: ReviewStore>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(admin): AdminUser,
    Path(report_id): Path<Uuid>,
    Json(req): Json<PriorityRequest>,
) -> AppResult<Json<ApiResponse<QueueEntry>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let entry = state.service.reprioritize(report_id, req.priority).await?;
    tracing::info!(admin_id = %admin.id, %report_id, priority = req.priority, "admin changed report priority");
    Ok(Json(ApiResponse::ok(entry)))
}

pub async fn get_stats<S: ReviewStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<DashboardStats>>> {
    let stats = state.service.dashboard_stats().await?;
    Ok(Json(ApiResponse::ok(stats)))
}

pub async fn sweep_sessions<S: ReviewStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<SweepResponse>>> {
    let cancelled = state.service.sweep_expired().await?;
    Ok(Json(ApiResponse::ok(SweepResponse {
        cancelled_sessions: cancelled.len(),
    })))
}
