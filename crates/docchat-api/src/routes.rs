//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::handlers::{documents, index, personas, query, sessions};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Query endpoints
        .route("/query", post(query::query_handler))
        .route("/personas", get(personas::list_personas))
        // Document endpoints
        .route(
            "/documents",
            post(documents::upload_document).delete(documents::delete_documents),
        )
        // Index endpoints
        .route("/index", get(index::get_index).delete(index::clear_index))
        // Session endpoints
        .route("/sessions", get(sessions::list_sessions))
        .route(
            "/sessions/:id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
}
