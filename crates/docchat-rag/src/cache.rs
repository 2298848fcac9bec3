//! Embedding cache for the RAG pipeline
//!
//! Wraps any `EmbeddingClient` so repeated texts (follow-up questions,
//! re-uploaded files) skip the remote embedding call.
//!
//! Uses the moka crate for thread-safe, async-compatible caching
//! with TTL support.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use docchat_core::{DocChatError, Result};
use docchat_vector::EmbeddingClient;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Cache Configuration
// ============================================================================

/// Configuration for cache behavior
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached embeddings
    pub max_capacity: u64,

    /// Time-to-live for entries (in seconds)
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // 10k embeddings @ ~6KB each (1536 x f32) = ~60MB
            max_capacity: 10_000,
            // Embeddings are stable, cache for 1 hour
            ttl_seconds: 3600,
        }
    }
}

// ============================================================================
// Cached Embedding Client
// ============================================================================

/// Embedding client with a text-keyed cache in front
#[derive(Clone)]
pub struct CachedEmbedding {
    inner: Arc<dyn EmbeddingClient>,
    cache: Cache<u64, Vec<f32>>,
    stats: Arc<CacheStats>,
}

impl CachedEmbedding {
    /// Wrap a client with the default configuration
    pub fn new(inner: Arc<dyn EmbeddingClient>) -> Self {
        Self::with_config(inner, &CacheConfig::default())
    }

    /// Wrap a client with a custom configuration
    pub fn with_config(inner: Arc<dyn EmbeddingClient>, config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.ttl_seconds))
            .build();

        Self {
            inner,
            cache,
            stats: Arc::new(CacheStats::new("embedding")),
        }
    }

    async fn lookup(&self, text: &str) -> Option<Vec<f32>> {
        let result = self.cache.get(&hash_text(text)).await;
        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        result
    }

    /// Drop every cached embedding
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        // Wait for all pending invalidations to complete
        self.cache.run_pending_tasks().await;
        self.stats.reset();
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl EmbeddingClient for CachedEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.lookup(text).await {
            return Ok(hit);
        }

        let embedding = self.inner.embed(text).await?;
        self.cache.insert(hash_text(text), embedding.clone()).await;
        self.stats.record_write();
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut slots: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut missing = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let hit = self.lookup(text).await;
            if hit.is_none() {
                missing.push(i);
            }
            slots.push(hit);
        }

        if !missing.is_empty() {
            let to_embed: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed_batch(&to_embed).await?;
            if fresh.len() != to_embed.len() {
                return Err(DocChatError::EmbeddingService(format!(
                    "Expected {} embeddings, received {}",
                    to_embed.len(),
                    fresh.len()
                )));
            }
            for (i, embedding) in missing.into_iter().zip(fresh) {
                self.cache.insert(hash_text(&texts[i]), embedding.clone()).await;
                self.stats.record_write();
                slots[i] = Some(embedding);
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

// ============================================================================
// Cache Statistics
// ============================================================================

/// Cache statistics tracker
#[derive(Debug)]
pub struct CacheStats {
    name: String,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStats {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Hit rate in `0.0..=1.0`
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    /// Snapshot for reporting
    pub fn report(&self) -> CacheStatsReport {
        CacheStatsReport {
            name: self.name.clone(),
            hits: self.hits(),
            misses: self.misses(),
            writes: self.writes(),
            total_requests: self.total_requests(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Serializable cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}
