//! RAG query handler
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use docchat_core::{Citation, Persona};
use docchat_rag::QueryRequest as EngineRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Query request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryRequest {
    /// User's question
    #[schema(example = "What is the refund window?")]
    pub query: String,

    /// Answer only from the uploaded document
    #[serde(default)]
    pub strict: Option<bool>,

    /// Persona name (`assistant`, `eli5`, `tutor`, `concise`)
    #[serde(default)]
    #[schema(example = "assistant")]
    pub persona: Option<String>,

    /// Conversation id; a new one is issued when omitted
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Citation information
#[derive(Debug, Serialize, ToSchema)]
pub struct CitationInfo {
    /// 1-based similarity rank
    #[schema(example = 1)]
    pub rank: usize,

    /// Source file name
    #[schema(example = "policy.pdf")]
    pub file_name: String,

    /// Page number if applicable
    #[schema(example = 2)]
    pub page: Option<u32>,

    /// Rendered label
    #[schema(example = "Source 1: policy.pdf (Page 2)")]
    pub label: String,
}

impl From<&Citation> for CitationInfo {
    fn from(citation: &Citation) -> Self {
        Self {
            rank: citation.rank,
            file_name: citation.file_name.clone(),
            page: citation.page,
            label: citation.to_string(),
        }
    }
}

/// Query response body
#[derive(Debug, Serialize, ToSchema)]
pub struct QueryResponse {
    /// Answer with the sources section appended
    pub text: String,

    /// Raw model answer
    pub answer: String,

    /// Source citations in rank order
    pub citations: Vec<CitationInfo>,

    /// Whether document context was retrieved
    pub used_retrieval: bool,

    /// Conversation id the turn was stored under
    pub session_id: String,

    /// Model that produced the answer
    pub model: String,

    /// Processing time in milliseconds
    #[schema(example = 1250)]
    pub processing_time_ms: u64,
}

/// Handle RAG query requests
#[utoipa::path(
    post,
    path = "/api/v1/query",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Query successful", body = QueryResponse),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 502, description = "Upstream failure", body = crate::error::ApiError)
    )
)]
pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    if req.query.trim().is_empty() {
        return Err(AppError::BadRequest("Query cannot be empty".to_string()));
    }

    let persona = req
        .persona
        .as_deref()
        .map(|p| p.parse::<Persona>())
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let request = EngineRequest {
        query: req.query,
        strict: req.strict,
        persona,
        session_id: Some(session_id.clone()),
    };

    let answer = state.engine.answer(&request).await?;

    Ok((
        StatusCode::OK,
        Json(QueryResponse {
            citations: answer.citations.iter().map(CitationInfo::from).collect(),
            text: answer.text,
            answer: answer.answer,
            used_retrieval: answer.used_retrieval,
            session_id,
            model: answer.model,
            processing_time_ms: answer.processing_time_ms,
        }),
    ))
}
