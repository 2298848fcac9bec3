//! In-memory vector store using cosine similarity
//!
//! Backed by a `HashMap` behind a `tokio::sync::RwLock`. Suitable for
//! development, tests and single-user runs without a Qdrant server.

use async_trait::async_trait;
use docchat_core::{DocChatError, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{IndexedVector, ScoredVector, VectorStore};

#[derive(Debug)]
struct Collection {
    dimension: usize,
    points: HashMap<Uuid, IndexedVector>,
}

/// Process-local vector store
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(name: &str) -> DocChatError {
    DocChatError::VectorStore(format!("collection '{name}' does not exist"))
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| Collection {
                dimension,
                points: HashMap::new(),
            });
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn upsert(&self, name: &str, vectors: &[IndexedVector]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;

        if let Some(bad) = vectors.iter().find(|v| v.vector.len() != collection.dimension) {
            return Err(DocChatError::VectorStore(format!(
                "vector dimension {} does not match collection dimension {}",
                bad.vector.len(),
                collection.dimension
            )));
        }

        for vector in vectors {
            collection.points.insert(vector.id, vector.clone());
        }
        Ok(())
    }

    async fn search(&self, name: &str, query: &[f32], limit: usize) -> Result<Vec<ScoredVector>> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;

        let mut scored: Vec<ScoredVector> = collection
            .points
            .values()
            .map(|point| ScoredVector {
                text: point.text.clone(),
                metadata: point.metadata.clone(),
                score: cosine_similarity(&point.vector, query),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn delete_by_source(&self, name: &str, source: &str) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;

        let before = collection.points.len();
        collection
            .points
            .retain(|_, point| point.metadata.source != source);
        Ok((before - collection.points.len()) as u64)
    }

    async fn count(&self, name: &str) -> Result<u64> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;
        Ok(collection.points.len() as u64)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::ChunkMetadata;
    use proptest::prelude::*;

    fn point(vector: Vec<f32>, source: &str) -> IndexedVector {
        IndexedVector {
            id: Uuid::new_v4(),
            vector,
            text: format!("from {source}"),
            metadata: ChunkMetadata {
                source: source.to_string(),
                page: None,
                start_index: 0,
            },
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_missing_collection_errors() {
        let store = InMemoryVectorStore::new();
        assert!(!store.collection_exists("c").await.unwrap());
        assert!(store.count("c").await.is_err());
        assert!(store.upsert("c", &[point(vec![1.0], "a")]).await.is_err());
        store.drop_collection("c").await.unwrap();
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 3).await.unwrap();
        let err = store
            .upsert("c", &[point(vec![1.0, 2.0], "a")])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VECTOR_STORE_ERROR");
    }

    #[tokio::test]
    async fn test_ensure_collection_keeps_points() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store.upsert("c", &[point(vec![1.0, 0.0], "a")]).await.unwrap();
        store.ensure_collection("c", 2).await.unwrap();
        assert_eq!(store.count("c").await.unwrap(), 1);
    }

    fn arb_vector(dim: usize) -> impl Strategy<Value = Vec<f32>> {
        proptest::collection::vec(-1.0f32..1.0f32, dim)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn search_ordered_and_bounded(
            vectors in proptest::collection::vec(arb_vector(8), 1..20),
            query in arb_vector(8),
            limit in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.ensure_collection("p", 8).await.unwrap();
                let points: Vec<_> = vectors.iter().cloned().map(|v| point(v, "s")).collect();
                store.upsert("p", &points).await.unwrap();
                store.search("p", &query, limit).await.unwrap()
            });

            prop_assert!(results.len() <= limit);
            prop_assert_eq!(results.len(), vectors.len().min(limit));
            for pair in results.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }

        #[test]
        fn delete_by_source_removes_only_that_source(
            sources in proptest::collection::vec(prop_oneof![Just("a"), Just("b"), Just("c")], 1..30),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (removed, remaining) = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.ensure_collection("p", 2).await.unwrap();
                let points: Vec<_> = sources.iter().map(|s| point(vec![1.0, 0.5], s)).collect();
                store.upsert("p", &points).await.unwrap();
                let removed = store.delete_by_source("p", "b").await.unwrap();
                let remaining = store.search("p", &[1.0, 0.5], 100).await.unwrap();
                (removed, remaining)
            });

            let expected = sources.iter().filter(|s| **s == "b").count() as u64;
            prop_assert_eq!(removed, expected);
            prop_assert!(remaining.iter().all(|r| r.metadata.source != "b"));
        }
    }
}
