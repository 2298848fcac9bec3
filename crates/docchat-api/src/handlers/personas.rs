//! Persona catalog handler

use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use docchat_core::Persona;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct PersonaInfo {
    #[schema(example = "eli5")]
    pub name: String,
    pub prompt: String,
    /// Used when a query names no persona
    pub is_default: bool,
}

/// List the available personas
#[utoipa::path(
    get,
    path = "/api/v1/personas",
    tag = "query",
    responses(
        (status = 200, description = "Persona catalog", body = [PersonaInfo])
    )
)]
pub async fn list_personas(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();

    let default = state.config.rag.default_persona;
    let personas: Vec<PersonaInfo> = Persona::ALL
        .iter()
        .map(|p| PersonaInfo {
            name: p.name().to_string(),
            prompt: p.prompt().to_string(),
            is_default: *p == default,
        })
        .collect();

    Json(personas)
}
