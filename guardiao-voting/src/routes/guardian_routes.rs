use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use guardiao_shared::errors::AppResult;
use guardiao_shared::types::api::ApiResponse;
use guardiao_shared::types::auth::AuthUser;

use crate::models::Guardian;
use crate::status::{GuardianStatus, Punishment, ReportStatus, VoteCategory};
use crate::store::ReviewStore;
use crate::voting::{AnonymousVote, ReviewPacket};
use crate::AppState;

// --- Request / Response types ---

#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    pub category: VoteCategory,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub report_id: Uuid,
    pub report_status: ReportStatus,
    pub total_votes: i32,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub punishment: Option<Punishment>,
    pub tally: Vec<AnonymousVote>,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub session_cancelled: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: GuardianStatus,
}

#[derive(Debug, Serialize)]
pub struct GuardianProfile {
    pub id: Uuid,
    pub status: GuardianStatus,
    pub level: i32,
    pub points: i32,
    pub accuracy_percentage: f64,
    pub last_activity: DateTime<Utc>,
}

impl From<Guardian> for GuardianProfile {
    fn from(g: Guardian) -> Self {
        Self {
            id: g.id,
            status: g.status,
            level: g.level,
            points: g.points,
            accuracy_percentage: g.accuracy_percentage(),
            last_activity: g.last_activity,
        }
    }
}

// --- Handlers ---

/// 204 when nothing is pending.
pub async fn claim_next<S: ReviewStore>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
) -> AppResult<Response> {
    let packet = state.service.claim_next(auth.id).await?;
    Ok(match packet {
        Some(packet) => Json(ApiResponse::ok(packet)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

pub async fn get_session<S: ReviewStore>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ReviewPacket>>> {
    let packet = state.service.session_view(session_id, auth.id).await?;
    Ok(Json(ApiResponse::ok(packet)))
}

pub async fn cast_vote<S: ReviewStore>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
    Json(req): Json<CastVoteRequest>,
) -> AppResult<Json<ApiResponse<VoteResponse>>> {
    let receipt = state
        .service
        .cast_vote(session_id, auth.id, req.category)
        .await?;

    Ok(Json(ApiResponse::ok(VoteResponse {
        report_id: receipt.report.id,
        report_status: receipt.report.status,
        total_votes: receipt.report.total_votes,
        completed: receipt.completed(),
        punishment: receipt.resolution.as_ref().map(|r| r.punishment),
        tally: receipt.tally,
    })))
}

pub async fn leave_session<S: ReviewStore>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<LeaveResponse>>> {
    let outcome = state.service.leave(session_id, auth.id).await?;
    Ok(Json(ApiResponse::ok(LeaveResponse {
        session_cancelled: outcome.cancelled.is_some(),
    })))
}

pub async fn set_status<S: ReviewStore>(
    State(state): State<Arc<AppState<S>>>,
    auth: AuthUser,
    Json(req): Json<StatusRequest>,
) -> AppResult<Json<ApiResponse<GuardianProfile>>> {
    let guardian = state.service.set_guardian_status(auth.id, req.status).await?;
    Ok(Json(ApiResponse::ok(guardian.into())))
}
