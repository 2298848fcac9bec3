//! Qdrant implementation for vector storage
//!
//! Provides connection management and vector operations
//! for document chunk embeddings.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use docchat_core::{ChunkMetadata, DatabaseConfig, DocChatError, Result};
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde::Serialize;
use std::collections::HashMap;

use crate::{IndexedVector, ScoredVector, VectorStore};

/// Qdrant vector store implementation
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    /// Create a new Qdrant connection
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        Self::from_url(&config.qdrant_url)
    }

    /// Connect to a Qdrant gRPC endpoint
    pub fn from_url(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| store_error("Qdrant connection failed", e))?;

        Ok(Self { client })
    }

    fn source_filter(source: &str) -> Filter {
        Filter::must([Condition::matches("source", source.to_string())])
    }
}

fn store_error(context: &str, err: impl std::fmt::Display) -> DocChatError {
    DocChatError::VectorStore(format!("{context}: {err}"))
}

/// Payload stored with each vector
#[derive(Debug, Clone, Serialize)]
struct VectorPayload<'a> {
    text: &'a str,
    source: &'a str,
    page: Option<u32>,
    start_index: usize,
}

fn payload_string(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<String> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn payload_integer(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<i64> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(n)) => Some(*n),
        Some(Kind::DoubleValue(d)) => Some(*d as i64),
        _ => None,
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if self.collection_exists(name).await? {
            tracing::debug!(collection = name, "Qdrant collection already exists");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
                    dimension as u64,
                    Distance::Cosine,
                )),
            )
            .await
            .map_err(|e| store_error("Failed to create collection", e))?;

        tracing::info!(collection = name, dimension, "Created Qdrant collection");
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        if !self.collection_exists(name).await? {
            return Ok(());
        }

        self.client
            .delete_collection(name)
            .await
            .map_err(|e| store_error("Failed to delete collection", e))?;

        tracing::info!(collection = name, "Deleted Qdrant collection");
        Ok(())
    }

    async fn upsert(&self, name: &str, vectors: &[IndexedVector]) -> Result<()> {
        if vectors.is_empty() {
            return Ok(());
        }

        let points = vectors
            .iter()
            .map(|v| {
                let payload = VectorPayload {
                    text: &v.text,
                    source: &v.metadata.source,
                    page: v.metadata.page,
                    start_index: v.metadata.start_index,
                };
                let json = serde_json::to_value(&payload)
                    .map_err(|e| store_error("Failed to encode payload", e))?;
                let payload = Payload::try_from(json)
                    .map_err(|e| store_error("Failed to encode payload", e))?;

                Ok(PointStruct::new(v.id.to_string(), v.vector.clone(), payload))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points).wait(true))
            .await
            .map_err(|e| store_error("Failed to upsert vectors", e))?;

        tracing::debug!(collection = name, count = vectors.len(), "Upserted vectors");
        Ok(())
    }

    async fn search(&self, name: &str, query: &[f32], limit: usize) -> Result<Vec<ScoredVector>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(name, query.to_vec(), limit as u64).with_payload(true),
            )
            .await
            .map_err(|e| store_error("Vector search failed", e))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let payload = point.payload;
                ScoredVector {
                    text: payload_string(&payload, "text").unwrap_or_default(),
                    metadata: ChunkMetadata {
                        source: payload_string(&payload, "source").unwrap_or_default(),
                        page: payload_integer(&payload, "page").map(|p| p as u32),
                        start_index: payload_integer(&payload, "start_index")
                            .map(|s| s as usize)
                            .unwrap_or_default(),
                    },
                    score: point.score,
                }
            })
            .collect())
    }

    async fn delete_by_source(&self, name: &str, source: &str) -> Result<u64> {
        // Qdrant's delete response carries no count, so count the matches first
        let matched = self
            .client
            .count(
                CountPointsBuilder::new(name)
                    .filter(Self::source_filter(source))
                    .exact(true),
            )
            .await
            .map_err(|e| store_error("Failed to count vectors", e))?
            .result
            .map(|r| r.count)
            .unwrap_or(0);

        if matched == 0 {
            return Ok(0);
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(name)
                    .points(Self::source_filter(source))
                    .wait(true),
            )
            .await
            .map_err(|e| store_error("Failed to delete vectors", e))?;

        Ok(matched)
    }

    async fn count(&self, name: &str) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(name).exact(true))
            .await
            .map_err(|e| store_error("Failed to count vectors", e))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| store_error("Failed to list collections", e))?;

        Ok(collections.collections.iter().any(|c| c.name == name))
    }
}
