//! Chat session handlers
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use docchat_core::{SessionRecord, SessionSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

/// Query parameters for session listing
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListSessionsQuery {
    /// Maximum sessions to return
    #[param(default = 20)]
    pub limit: Option<i64>,
}

/// One session in a listing
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionInfo {
    pub session_id: String,
    /// Taken from the first user message
    #[schema(example = "What is the refund policy?")]
    pub subject: Option<String>,
    pub message_count: i64,
    /// RFC 3339 timestamp of the latest message
    pub last_activity: String,
}

impl From<SessionSummary> for SessionInfo {
    fn from(summary: SessionSummary) -> Self {
        Self {
            session_id: summary.session_id,
            subject: summary.subject,
            message_count: summary.message_count,
            last_activity: summary.last_activity.to_rfc3339(),
        }
    }
}

/// Session list response
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
    pub total: usize,
}

/// One stored message
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageInfo {
    pub id: i64,
    /// `user` or `assistant`
    pub role: String,
    pub content: String,
    pub created_at: String,
}

impl From<SessionRecord> for MessageInfo {
    fn from(record: SessionRecord) -> Self {
        Self {
            id: record.id,
            role: record.message.role.to_string(),
            content: record.message.content,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

/// Session detail response
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionDetailResponse {
    pub session_id: String,
    pub subject: Option<String>,
    pub messages: Vec<MessageInfo>,
}

/// Delete session response
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteSessionResponse {
    pub session_id: String,
    /// Number of messages removed
    pub removed: u64,
}

/// List recent sessions
#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    tag = "sessions",
    params(ListSessionsQuery),
    responses(
        (status = 200, description = "Session list", body = SessionListResponse)
    )
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListSessionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let limit = params.limit.unwrap_or(20).clamp(1, 500);
    let sessions: Vec<SessionInfo> = state
        .sessions
        .list_sessions(limit)
        .await?
        .into_iter()
        .map(SessionInfo::from)
        .collect();

    Ok((
        StatusCode::OK,
        Json(SessionListResponse {
            total: sessions.len(),
            sessions,
        }),
    ))
}

/// Get the messages of one session
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}",
    tag = "sessions",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    responses(
        (status = 200, description = "Session messages", body = SessionDetailResponse),
        (status = 404, description = "Session not found", body = crate::error::ApiError)
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let records = state.sessions.records(&id).await?;
    if records.is_empty() {
        return Err(AppError::NotFound(format!("Session {id}")));
    }

    let subject = records.iter().find_map(|r| r.subject.clone());
    Ok((
        StatusCode::OK,
        Json(SessionDetailResponse {
            session_id: id,
            subject,
            messages: records.into_iter().map(MessageInfo::from).collect(),
        }),
    ))
}

/// Delete a session and its messages
#[utoipa::path(
    delete,
    path = "/api/v1/sessions/{id}",
    tag = "sessions",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    responses(
        (status = 200, description = "Session deleted", body = DeleteSessionResponse),
        (status = 404, description = "Session not found", body = crate::error::ApiError)
    )
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let removed = state.sessions.delete_session(&id).await?;
    if removed == 0 {
        return Err(AppError::NotFound(format!("Session {id}")));
    }

    tracing::info!(session_id = %id, removed, "Deleted session");
    Ok((
        StatusCode::OK,
        Json(DeleteSessionResponse {
            session_id: id,
            removed,
        }),
    ))
}
