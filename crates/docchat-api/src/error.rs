//! API error handling
//!
//! Author: hephaex@gmail.com

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docchat_core::DocChatError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// The uploaded file could not be read
    UnprocessableFile(String),
    /// An upstream service (embedding, LLM, vector store, database) failed
    Upstream { code: &'static str, message: String },
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::not_found(&msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::UnprocessableFile(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiError::new("UNSUPPORTED_OR_CORRUPT_FILE", format!("Error processing file: {msg}")),
            ),
            AppError::Upstream { code, message } => (
                StatusCode::BAD_GATEWAY,
                ApiError::new(code, "Upstream service failed").with_details(message),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal_error().with_details(msg),
            ),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, code = %error.code, details = ?error.details, "Request failed");
        }

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<DocChatError> for AppError {
    fn from(err: DocChatError) -> Self {
        let code = err.code();
        match err {
            DocChatError::NotFound(msg) => AppError::NotFound(msg),
            DocChatError::Validation(msg) => AppError::BadRequest(msg),
            DocChatError::UnsupportedOrCorruptFile { .. } => {
                AppError::UnprocessableFile(err.to_string())
            }
            DocChatError::EmbeddingService(_)
            | DocChatError::LanguageModelService(_)
            | DocChatError::VectorStore(_)
            | DocChatError::StorageConnection(_) => AppError::Upstream {
                code,
                message: err.to_string(),
            },
            DocChatError::Config(msg) => AppError::Internal(format!("Configuration error: {msg}")),
            DocChatError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}
