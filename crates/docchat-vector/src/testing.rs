//! Deterministic embedding clients for tests

use async_trait::async_trait;
use docchat_core::{DocChatError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::EmbeddingClient;

/// Hashed bag-of-words embedding: texts sharing words score as similar
#[derive(Debug, Default)]
pub struct KeywordEmbedding {
    calls: AtomicUsize,
}

impl KeywordEmbedding {
    pub const DIMENSION: usize = 256;

    pub fn new() -> Self {
        Self::default()
    }

    /// Number of embed / embed_batch calls served
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; Self::DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in word.to_lowercase().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            vector[(hash % Self::DIMENSION as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingClient for KeywordEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }

    fn dimension(&self) -> usize {
        Self::DIMENSION
    }
}

/// Embedding client whose every call fails
#[derive(Debug)]
pub struct FailingEmbedding {
    dimension: usize,
}

impl FailingEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingClient for FailingEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(DocChatError::EmbeddingService(
            "quota exceeded".to_string(),
        ))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(DocChatError::EmbeddingService(
            "quota exceeded".to_string(),
        ))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
