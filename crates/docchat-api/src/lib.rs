//! DocChat API - REST server
//!
//! Provides HTTP endpoints for uploading documents, asking questions
//! against them and managing chat sessions.
//!
//! Author: hephaex@gmail.com

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::{extract::DefaultBodyLimit, http::HeaderValue, routing::get, Router};
use handlers::{documents, health, index, personas, query, sessions};
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI document for the v1 API
#[derive(OpenApi)]
#[openapi(
    info(title = "DocChat API", description = "Chat with your documents"),
    paths(
        health::health_check,
        health::readiness_check,
        health::metrics,
        query::query_handler,
        personas::list_personas,
        documents::upload_document,
        documents::delete_documents,
        index::get_index,
        index::clear_index,
        sessions::list_sessions,
        sessions::get_session,
        sessions::delete_session,
    ),
    components(schemas(
        error::ApiError,
        health::HealthResponse,
        health::ReadinessResponse,
        health::ReadinessChecks,
        health::MetricsResponse,
        query::QueryRequest,
        query::QueryResponse,
        query::CitationInfo,
        personas::PersonaInfo,
        documents::UploadDocumentRequest,
        documents::UploadDocumentResponse,
        documents::DeleteDocumentResponse,
        index::IndexInfo,
        index::ClearIndexResponse,
        sessions::SessionInfo,
        sessions::SessionListResponse,
        sessions::MessageInfo,
        sessions::SessionDetailResponse,
        sessions::DeleteSessionResponse,
    )),
    tags(
        (name = "health", description = "Liveness, readiness and metrics"),
        (name = "query", description = "Retrieval-augmented answering"),
        (name = "documents", description = "Upload and delete-by-source"),
        (name = "index", description = "Vector index status and clearing"),
        (name = "sessions", description = "Conversation history")
    )
)]
pub struct ApiDoc;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        tracing::info!("No CORS origins configured, cross-origin requests are refused");
        return layer;
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;

    let mut router = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::prometheus_metrics))
        .nest("/api/v1", routes::api_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(server.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http());

    if server.cors_enabled {
        router = router.layer(cors_layer(&server.cors_origins));
    }

    router.with_state(state)
}

/// State wired to in-memory stores, a keyword embedder and a scripted model
#[cfg(feature = "test-utils")]
pub fn create_test_state() -> Arc<AppState> {
    use docchat_core::{AppConfig, InMemorySessionStore, IndexMode};
    use docchat_rag::testing::MockLlm;
    use docchat_vector::testing::KeywordEmbedding;
    use docchat_vector::{InMemoryVectorStore, VectorIndex};

    let mut config = AppConfig::default();
    config.server.upload_dir =
        std::env::temp_dir().join(format!("docchat-uploads-{}", uuid::Uuid::new_v4()));
    config.rag.index_mode = IndexMode::Accumulate;

    let index = Arc::new(VectorIndex::new(
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(KeywordEmbedding::new()),
        "api_test_chunks",
        config.rag.index_mode,
    ));

    match AppState::new(
        config,
        index,
        Arc::new(MockLlm::replying("Mock answer.")),
        Arc::new(InMemorySessionStore::new()),
    ) {
        Ok(state) => Arc::new(state),
        Err(e) => panic!("default test configuration is invalid: {e}"),
    }
}

/// Router over `create_test_state()`
#[cfg(feature = "test-utils")]
pub fn create_router_for_testing() -> Router {
    create_router(create_test_state())
}
