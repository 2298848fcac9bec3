//! Scripted language-model client for tests

use async_trait::async_trait;
use docchat_core::{ChatRequest, DocChatError, LlmClient, Result};
use std::sync::Mutex;

/// LLM client that records every request and replies with a fixed answer
#[derive(Debug)]
pub struct MockLlm {
    reply: Option<String>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockLlm {
    /// Always answer with `reply`
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always fail with a language-model error
    pub fn failing() -> Self {
        Self {
            reply: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests().pop()
    }

    pub fn request_count(&self) -> usize {
        self.requests().len()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.reply
            .clone()
            .ok_or_else(|| DocChatError::LanguageModelService("model unavailable".to_string()))
    }

    fn model(&self) -> &str {
        "mock-llm"
    }
}
