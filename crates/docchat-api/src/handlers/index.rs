//! Vector index handlers
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Index status
#[derive(Debug, Serialize, ToSchema)]
pub struct IndexInfo {
    /// Collection name
    #[schema(example = "docchat_chunks")]
    pub collection: String,

    /// `ephemeral` or `accumulate`
    #[schema(example = "accumulate")]
    pub mode: String,

    /// `absent`, `created` or `populated`
    #[schema(example = "populated")]
    pub state: String,

    /// Stored vectors
    pub points: u64,

    /// Vector dimension
    #[schema(example = 1536)]
    pub dimension: usize,
}

/// Clear index response
#[derive(Debug, Serialize, ToSchema)]
pub struct ClearIndexResponse {
    pub message: String,
}

/// Describe the vector index
#[utoipa::path(
    get,
    path = "/api/v1/index",
    tag = "index",
    responses(
        (status = 200, description = "Index status", body = IndexInfo),
        (status = 502, description = "Vector store unreachable", body = crate::error::ApiError)
    )
)]
pub async fn get_index(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let index = &state.index;
    Ok((
        StatusCode::OK,
        Json(IndexInfo {
            collection: index.collection().to_string(),
            mode: index.mode().to_string(),
            state: index.state().await?.to_string(),
            points: index.point_count().await?,
            dimension: index.dimension(),
        }),
    ))
}

/// Drop every indexed chunk
#[utoipa::path(
    delete,
    path = "/api/v1/index",
    tag = "index",
    responses(
        (status = 200, description = "Index cleared", body = ClearIndexResponse)
    )
)]
pub async fn clear_index(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    {
        let _guard = state.write_lock.lock().await;
        state.index.clear().await?;
    }

    Ok((
        StatusCode::OK,
        Json(ClearIndexResponse {
            message: format!("Cleared collection {}", state.index.collection()),
        }),
    ))
}
