//! Backend wiring shared by the server and the CLI

use docchat_core::{
    AppConfig, DocChatError, InMemorySessionStore, LlmClient, PgSessionStore, Result, SessionBackend,
    SessionStore, VectorBackend,
};
use docchat_vector::{
    create_embedding_client, EmbeddingClient, InMemoryVectorStore, QdrantStore, VectorIndex,
    VectorStore,
};
use std::sync::Arc;

use crate::cache::{CacheConfig, CacheStats, CachedEmbedding};
use crate::llm::create_llm_client;
use crate::{IngestService, RagEngine};

/// Every long-lived component of one process
pub struct Pipeline {
    pub index: Arc<VectorIndex>,
    pub engine: Arc<RagEngine>,
    pub ingest: Arc<IngestService>,
    pub sessions: Arc<dyn SessionStore>,
    /// Present when embeddings go through the cache
    pub cache_stats: Option<Arc<CacheStats>>,
}

impl Pipeline {
    /// Assemble from already-built components
    pub fn new(
        config: &AppConfig,
        index: Arc<VectorIndex>,
        llm: Arc<dyn LlmClient>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let ingest = IngestService::new(Arc::clone(&index), &config.rag)?;
        let engine = RagEngine::new(
            Arc::clone(&index),
            llm,
            Arc::clone(&sessions),
            config.rag.clone(),
        );

        Ok(Self {
            index,
            engine: Arc::new(engine),
            ingest: Arc::new(ingest),
            sessions,
            cache_stats: None,
        })
    }

    /// Connect the vector store, session store, embedding and LLM clients
    /// selected by the configuration
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingClient> = Arc::from(create_embedding_client(&config.llm)?);
        if embedder.dimension() != config.database.vector_dimension {
            return Err(DocChatError::Config(format!(
                "Embedding model {} produces {}-dimensional vectors but VECTOR_DIMENSION is {}",
                config.llm.embedding_model,
                embedder.dimension(),
                config.database.vector_dimension
            )));
        }
        let cached = CachedEmbedding::with_config(
            embedder,
            &CacheConfig {
                max_capacity: config.rag.embedding_cache_capacity,
                ..CacheConfig::default()
            },
        );
        let cache_stats = cached.stats();

        let store: Arc<dyn VectorStore> = match config.database.vector_backend {
            VectorBackend::Qdrant => Arc::new(QdrantStore::new(&config.database)?),
            VectorBackend::Memory => Arc::new(InMemoryVectorStore::new()),
        };

        let index = Arc::new(
            VectorIndex::new(
                store,
                Arc::new(cached),
                config.database.qdrant_collection.clone(),
                config.rag.index_mode,
            )
            .with_dimension(config.database.vector_dimension),
        );

        let sessions: Arc<dyn SessionStore> = match config.database.session_backend {
            SessionBackend::Postgres => {
                let store = PgSessionStore::new(
                    &config.database.postgres_url,
                    config.database.postgres_pool_size,
                )
                .await?;
                store.migrate().await?;
                Arc::new(store)
            }
            SessionBackend::Memory => Arc::new(InMemorySessionStore::new()),
        };

        let llm: Arc<dyn LlmClient> = Arc::from(create_llm_client(&config.llm)?);

        tracing::info!(
            vector_backend = ?config.database.vector_backend,
            session_backend = sessions.backend(),
            index_mode = %config.rag.index_mode,
            model = llm.model(),
            "Backends initialized"
        );

        let mut pipeline = Self::new(config, index, llm, sessions)?;
        pipeline.cache_stats = Some(cache_stats);
        Ok(pipeline)
    }
}
