//! Document upload and delete-by-source handlers
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use base64::Engine;
use docchat_rag::upload_message;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

/// Upload document request
///
/// Either `path` (a file already inside the upload directory) or
/// `file_name` plus base64 `content` must be given.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadDocumentRequest {
    /// File inside the upload directory, absolute or relative to it
    #[schema(example = "handbook.pdf")]
    pub path: Option<String>,

    /// File name for inline content
    #[schema(example = "handbook.pdf")]
    pub file_name: Option<String>,

    /// Base64 encoded file content
    pub content: Option<String>,
}

/// Upload document response
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadDocumentResponse {
    /// Status line shown to the user
    #[schema(example = "Processed handbook.pdf into 42 chunks.")]
    pub message: String,

    /// Source path recorded on every chunk
    pub source: String,

    /// Displayed file name
    pub file_name: String,

    /// Pages read from the file
    pub pages: usize,

    /// Chunks indexed
    #[schema(example = 42)]
    pub chunks: usize,

    /// Index mode (`ephemeral` or `accumulate`)
    pub mode: String,
}

/// Keep only the final path component of a client-supplied name
fn sanitize_file_name(name: &str) -> Option<String> {
    Path::new(name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map(|n| n.to_string())
}

async fn store_inline_upload(
    upload_dir: &Path,
    file_name: &str,
    content: &str,
) -> Result<PathBuf, AppError> {
    let name = sanitize_file_name(file_name)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid file name: {file_name}")))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(content.trim())
        .map_err(|e| AppError::BadRequest(format!("Invalid base64 content: {e}")))?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest("Content cannot be empty".to_string()));
    }

    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create upload dir: {e}")))?;

    let target = upload_dir.join(name);
    tokio::fs::write(&target, &bytes)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store upload: {e}")))?;

    tracing::debug!(path = %target.display(), bytes = bytes.len(), "Stored upload");
    Ok(target)
}

/// Resolve a client-supplied path, refusing anything outside the upload directory
async fn resolve_upload_path(upload_dir: &Path, path: &str) -> Result<PathBuf, AppError> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create upload dir: {e}")))?;
    let root = tokio::fs::canonicalize(upload_dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to resolve upload dir: {e}")))?;

    let requested = Path::new(path);
    let candidate = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };

    // Symlinks and `..` are resolved before the containment check
    let resolved = tokio::fs::canonicalize(&candidate)
        .await
        .map_err(|_| AppError::BadRequest(format!("File not found in upload directory: {path}")))?;
    if !resolved.starts_with(&root) {
        tracing::warn!(path = %path, "Rejected upload path outside upload directory");
        return Err(AppError::BadRequest(format!(
            "Path is outside the upload directory: {path}"
        )));
    }
    Ok(resolved)
}

/// Upload and index a document
#[utoipa::path(
    post,
    path = "/api/v1/documents",
    tag = "documents",
    request_body = UploadDocumentRequest,
    responses(
        (status = 201, description = "Document indexed", body = UploadDocumentResponse),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 422, description = "Unsupported or corrupt file", body = crate::error::ApiError),
        (status = 502, description = "Embedding or vector store failure", body = crate::error::ApiError)
    )
)]
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UploadDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let path = match (req.path.as_deref(), req.file_name.as_deref(), req.content.as_deref()) {
        (_, Some(name), Some(content)) => {
            store_inline_upload(&state.config.server.upload_dir, name, content).await?
        }
        (Some(path), _, _) if !path.trim().is_empty() => {
            resolve_upload_path(&state.config.server.upload_dir, path.trim()).await?
        }
        _ => {
            return Err(AppError::BadRequest(
                "Either path or file_name with content is required".to_string(),
            ))
        }
    };

    let outcome = {
        let _guard = state.write_lock.lock().await;
        state.ingest.ingest(&path).await
    };
    let message = upload_message(&outcome);
    let report = outcome?;

    Ok((
        StatusCode::CREATED,
        Json(UploadDocumentResponse {
            message,
            source: report.source,
            file_name: report.file_name,
            pages: report.pages,
            chunks: report.chunks,
            mode: report.mode.to_string(),
        }),
    ))
}

/// Query parameters for delete-by-source
#[derive(Debug, Deserialize, IntoParams)]
pub struct DeleteDocumentsQuery {
    /// Source path exactly as recorded at upload
    pub source: String,
}

/// Delete document response
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteDocumentResponse {
    pub source: String,
    /// Number of vectors removed
    pub removed: u64,
    pub message: String,
}

/// Remove every chunk of one source file from the index
#[utoipa::path(
    delete,
    path = "/api/v1/documents",
    tag = "documents",
    params(DeleteDocumentsQuery),
    responses(
        (status = 200, description = "Chunks removed", body = DeleteDocumentResponse),
        (status = 400, description = "Missing source", body = crate::error::ApiError)
    )
)]
pub async fn delete_documents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DeleteDocumentsQuery>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let source = params.source.trim();
    if source.is_empty() {
        return Err(AppError::BadRequest("Source cannot be empty".to_string()));
    }

    let removed = {
        let _guard = state.write_lock.lock().await;
        state.index.delete_by_source(source).await?
    };

    Ok((
        StatusCode::OK,
        Json(DeleteDocumentResponse {
            source: source.to_string(),
            removed,
            message: format!("Removed {removed} chunks from {source}"),
        }),
    ))
}
