//! Health check handlers
//!
//! Author: hephaex@gmail.com

use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub name: String,
}

/// Liveness probe - basic health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
    })
}

/// Readiness response
#[derive(Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: ReadinessChecks,
}

#[derive(Serialize, ToSchema)]
pub struct ReadinessChecks {
    pub vector_store: bool,
    pub session_store: bool,
    pub llm_model: String,
}

/// Readiness probe - checks dependencies
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Service not ready", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let vector_store = match state.index.state().await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Vector store readiness check failed");
            false
        }
    };
    let session_store = match state.sessions.list_sessions(1).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Session store readiness check failed");
            false
        }
    };

    let ready = state.is_ready() && vector_store && session_store;
    let response = ReadinessResponse {
        ready,
        checks: ReadinessChecks {
            vector_store,
            session_store,
            llm_model: state.engine.model().to_string(),
        },
    };

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// JSON metrics response
#[derive(Serialize, ToSchema)]
pub struct MetricsResponse {
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub requests_per_second: f64,
    pub indexed_chunks: u64,
    pub embedding_cache_hits: u64,
    pub embedding_cache_misses: u64,
}

/// Request and index counters as JSON
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "health",
    responses(
        (status = 200, description = "Service metrics", body = MetricsResponse)
    )
)]
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.uptime_secs();
    let total_requests = state.get_request_count();
    let rps = if uptime > 0 {
        total_requests as f64 / uptime as f64
    } else {
        0.0
    };
    let (hits, misses) = state.get_cache_stats();

    Json(MetricsResponse {
        uptime_seconds: uptime,
        total_requests,
        requests_per_second: rps,
        indexed_chunks: state.index.point_count().await.unwrap_or(0),
        embedding_cache_hits: hits,
        embedding_cache_misses: misses,
    })
}

/// Prometheus text exposition of the same counters
pub async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.uptime_secs();
    let total_requests = state.get_request_count();
    let (cache_hits, cache_misses) = state.get_cache_stats();
    let indexed = state.index.point_count().await.unwrap_or(0);

    let mut output = String::new();
    let mut gauge = |name: &str, kind: &str, help: &str, value: String| {
        output.push_str(&format!("# HELP {name} {help}\n"));
        output.push_str(&format!("# TYPE {name} {kind}\n"));
        output.push_str(&format!("{name} {value}\n\n"));
    };

    gauge(
        "docchat_uptime_seconds",
        "gauge",
        "Time since server start",
        uptime.to_string(),
    );
    gauge(
        "docchat_requests_total",
        "counter",
        "Total number of API requests",
        total_requests.to_string(),
    );
    gauge(
        "docchat_indexed_chunks",
        "gauge",
        "Vectors stored in the index collection",
        indexed.to_string(),
    );
    gauge(
        "docchat_embedding_cache_hits_total",
        "counter",
        "Embedding cache hits",
        cache_hits.to_string(),
    );
    gauge(
        "docchat_embedding_cache_misses_total",
        "counter",
        "Embedding cache misses",
        cache_misses.to_string(),
    );

    let total_cache = cache_hits + cache_misses;
    if total_cache > 0 {
        let hit_rate = cache_hits as f64 / total_cache as f64;
        gauge(
            "docchat_embedding_cache_hit_rate",
            "gauge",
            "Embedding cache hit rate (0.0 to 1.0)",
            format!("{hit_rate:.4}"),
        );
    }

    output.push_str(&format!(
        "docchat_build_info{{version=\"{}\"}} 1\n",
        env!("CARGO_PKG_VERSION")
    ));

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        output,
    )
}
