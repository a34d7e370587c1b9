//! Endpoints called by the Discord bot, authenticated with the shared token.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use guardiao_shared::errors::{AppError, AppResult, ErrorCode};
use guardiao_shared::middleware::InternalCaller;
use guardiao_shared::types::api::ApiResponse;

use crate::models::{Guardian, Report};
use crate::services::moderation_service::{NewReport, TranscriptInput};
use crate::store::ReviewStore;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TranscriptLineRequest {
    #[validate(length(min = 1, max = 100))]
    pub author_alias: String,
    #[validate(length(max = 4000))]
    pub content: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub from_accused: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FileReportRequest {
    pub guild_id: i64,
    pub channel_id: i64,
    pub reported_user_id: i64,
    pub reporter_user_id: i64,
    #[validate(length(min = 1, max = 1000, message = "reason must be 1-1000 characters"))]
    pub reason: String,
    #[validate(length(max = 200))]
    #[validate]
    #[serde(default)]
    pub transcript: Vec<TranscriptLineRequest>,
}

pub async fn file_report<S: ReviewStore>(
    State(state): State<Arc<AppState<S>>>,
    _caller: InternalCaller,
    Json(req): Json<FileReportRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Report>>)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let input = NewReport {
        guild_id: req.guild_id,
        channel_id: req.channel_id,
        reported_user_id: req.reported_user_id,
        reporter_user_id: req.reporter_user_id,
        reason: req.reason,
        transcript: req
            .transcript
            .into_iter()
            .map(|line| TranscriptInput {
                author_alias: line.author_alias,
                content: line.content,
                sent_at: line.sent_at,
                from_accused: line.from_accused,
            })
            .collect(),
    };

    let report = state.service.file_report(input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(report))))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterGuardianRequest {
    pub discord_id: i64,
    #[validate(length(min = 1, max = 100))]
    pub username: String,
    #[validate(length(min = 1, max = 100))]
    pub display_name: String,
}

pub async fn register_guardian<S: ReviewStore>(
    State(state): State<Arc<AppState<S>>>,
    _caller: InternalCaller,
    Json(req): Json<RegisterGuardianRequest>,
) -> AppResult<Json<ApiResponse<Guardian>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let guardian = state
        .service
        .register_guardian(req.discord_id, req.username, req.display_name)
        .await?;
    Ok(Json(ApiResponse::ok(guardian)))
}
