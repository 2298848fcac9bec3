//! Application state management
//!
//! Author: hephaex@gmail.com

use docchat_core::{AppConfig, LlmClient, Result, SessionStore};
use docchat_rag::{CacheStats, IngestService, Pipeline, RagEngine};
use docchat_vector::VectorIndex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Answering engine
    pub engine: Arc<RagEngine>,
    /// Upload pipeline
    pub ingest: Arc<IngestService>,
    /// Vector index handle shared by the engine and the upload pipeline
    pub index: Arc<VectorIndex>,
    /// Chat history
    pub sessions: Arc<dyn SessionStore>,
    /// Embedding cache statistics, when the cache is enabled
    pub cache_stats: Option<Arc<CacheStats>>,
    /// Serializes index writes (upload, delete, clear)
    pub write_lock: Mutex<()>,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Ready status
    pub is_ready: AtomicBool,
}

impl AppState {
    /// Assemble state from already-built components
    pub fn new(
        config: AppConfig,
        index: Arc<VectorIndex>,
        llm: Arc<dyn LlmClient>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let pipeline = Pipeline::new(&config, index, llm, sessions)?;
        Ok(Self::from_pipeline(config, pipeline))
    }

    /// Build every backend selected by the configuration
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let pipeline = Pipeline::from_config(&config).await?;
        Ok(Self::from_pipeline(config, pipeline))
    }

    fn from_pipeline(config: AppConfig, pipeline: Pipeline) -> Self {
        Self {
            config,
            engine: pipeline.engine,
            ingest: pipeline.ingest,
            index: pipeline.index,
            sessions: pipeline.sessions,
            cache_stats: pipeline.cache_stats,
            write_lock: Mutex::new(()),
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(true),
        }
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }

    /// Embedding cache hits and misses
    pub fn get_cache_stats(&self) -> (u64, u64) {
        self.cache_stats
            .as_ref()
            .map(|s| (s.hits(), s.misses()))
            .unwrap_or((0, 0))
    }
}
