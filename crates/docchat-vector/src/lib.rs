//! DocChat Vector - Embeddings and the vector index
//!
//! Provides the `VectorStore` abstraction over Qdrant and an in-memory
//! backend, and the `VectorIndex` handle that ties a store, an embedding
//! client and a collection lifecycle together.

pub mod embedding;
pub mod memory_store;
pub mod qdrant_store;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use embedding::{create_embedding_client, EmbeddingClient, OllamaEmbedding, OpenAiEmbedding};
pub use memory_store::InMemoryVectorStore;
pub use qdrant_store::QdrantStore;

use async_trait::async_trait;
use docchat_core::{Chunk, ChunkMetadata, DocChatError, IndexMode, Result, RetrievalResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// A stored vector with its chunk text and provenance
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// One nearest-neighbour hit from a store
#[derive(Debug, Clone)]
pub struct ScoredVector {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// Trait for vector database operations
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// Remove the collection and all of its vectors; missing is not an error
    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Store vectors
    async fn upsert(&self, name: &str, vectors: &[IndexedVector]) -> Result<()>;

    /// Nearest neighbours by cosine similarity, best first
    async fn search(&self, name: &str, query: &[f32], limit: usize) -> Result<Vec<ScoredVector>>;

    /// Delete every vector whose metadata source equals `source`
    async fn delete_by_source(&self, name: &str, source: &str) -> Result<u64>;

    /// Number of stored vectors
    async fn count(&self, name: &str) -> Result<u64>;

    /// Whether the collection exists
    async fn collection_exists(&self, name: &str) -> Result<bool>;
}

/// Observable lifecycle of the index collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionState {
    Absent,
    Created,
    Populated,
}

impl std::fmt::Display for CollectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Created => write!(f, "created"),
            Self::Populated => write!(f, "populated"),
        }
    }
}

/// Handle over one named collection
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    collection: String,
    dimension: usize,
    mode: IndexMode,
}

impl VectorIndex {
    /// Create a handle; the dimension comes from the embedding client
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        collection: impl Into<String>,
        mode: IndexMode,
    ) -> Self {
        let dimension = embedder.dimension();
        Self {
            store,
            embedder,
            collection: collection.into(),
            dimension,
            mode,
        }
    }

    /// Override the collection dimension
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn mode(&self) -> IndexMode {
        self.mode
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingClient> {
        &self.embedder
    }

    pub async fn state(&self) -> Result<CollectionState> {
        if !self.store.collection_exists(&self.collection).await? {
            return Ok(CollectionState::Absent);
        }
        match self.store.count(&self.collection).await? {
            0 => Ok(CollectionState::Created),
            _ => Ok(CollectionState::Populated),
        }
    }

    /// Create the collection if needed
    pub async fn ensure_collection(&self) -> Result<()> {
        self.store
            .ensure_collection(&self.collection, self.dimension)
            .await
    }

    /// Embed and store chunks, returning how many were stored
    ///
    /// In ephemeral mode the previous collection is dropped first, but only
    /// once the new embeddings are in hand, so a failed embedding call leaves
    /// the old contents searchable.
    pub async fn upsert(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            tracing::debug!(collection = %self.collection, "No chunks to index");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(DocChatError::EmbeddingService(format!(
                "Expected {} embeddings, received {}",
                chunks.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(DocChatError::EmbeddingService(format!(
                "Embedding dimension {} does not match collection dimension {}",
                bad.len(),
                self.dimension
            )));
        }

        if self.mode == IndexMode::Ephemeral {
            self.store.drop_collection(&self.collection).await?;
        }
        self.ensure_collection().await?;

        let points: Vec<IndexedVector> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedVector {
                id: Uuid::new_v4(),
                vector,
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
            })
            .collect();

        self.store.upsert(&self.collection, &points).await?;

        tracing::info!(
            collection = %self.collection,
            mode = %self.mode,
            count = points.len(),
            "Indexed chunks"
        );
        Ok(points.len())
    }

    /// Top `k` chunks for a query, ranked from 1
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if k == 0 || !self.store.collection_exists(&self.collection).await? {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await?;
        let hits = self
            .store
            .search(&self.collection, &query_vector, k)
            .await?;

        Ok(hits
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(i, hit)| RetrievalResult {
                text: hit.text,
                metadata: hit.metadata,
                rank: i + 1,
                score: hit.score,
            })
            .collect())
    }

    /// Remove all vectors of one source file
    pub async fn delete_by_source(&self, source: &str) -> Result<u64> {
        if !self.store.collection_exists(&self.collection).await? {
            tracing::info!(source, "No collection, nothing to delete");
            return Ok(0);
        }

        let removed = self
            .store
            .delete_by_source(&self.collection, source)
            .await?;
        if removed == 0 {
            tracing::info!(source, collection = %self.collection, "No vectors matched source");
        } else {
            tracing::info!(source, removed, "Deleted vectors by source");
        }
        Ok(removed)
    }

    /// Drop the collection; the next upsert recreates it
    pub async fn clear(&self) -> Result<()> {
        self.store.drop_collection(&self.collection).await?;
        tracing::info!(collection = %self.collection, "Cleared index");
        Ok(())
    }

    /// Number of stored vectors; zero when the collection is absent
    pub async fn point_count(&self) -> Result<u64> {
        if !self.store.collection_exists(&self.collection).await? {
            return Ok(0);
        }
        self.store.count(&self.collection).await
    }
}
