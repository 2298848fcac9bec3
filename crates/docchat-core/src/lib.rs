//! DocChat Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout DocChat:
//! - Source documents, chunks and retrieval results
//! - Chat messages and the language-model client trait
//! - Common error types
//! - Configuration management
//! - Session storage (PostgreSQL or in-memory)

pub mod config;
pub mod persona;
pub mod session;

pub use config::{
    AppConfig, ConfigError, DatabaseConfig, IndexMode, LlmConfig, LlmProvider, RagConfig,
    SessionBackend, VectorBackend,
};
pub use persona::{ChatSettings, Persona};
pub use session::{InMemorySessionStore, PgSessionStore, SessionRecord, SessionStore, SessionSummary};

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for DocChat operations
#[derive(Error, Debug)]
pub enum DocChatError {
    #[error("Unsupported or corrupt file {path}: {reason}")]
    UnsupportedOrCorruptFile { path: String, reason: String },

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Language model service error: {0}")]
    LanguageModelService(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Storage connection error: {0}")]
    StorageConnection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DocChatError {
    /// Short machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedOrCorruptFile { .. } => "UNSUPPORTED_OR_CORRUPT_FILE",
            Self::EmbeddingService(_) => "EMBEDDING_SERVICE_ERROR",
            Self::LanguageModelService(_) => "LANGUAGE_MODEL_SERVICE_ERROR",
            Self::VectorStore(_) => "VECTOR_STORE_ERROR",
            Self::StorageConnection(_) => "STORAGE_CONNECTION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Other(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, DocChatError>;

// ============================================================================
// Document Models
// ============================================================================

/// One page (PDF) or the whole body (plain text) of a loaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePage {
    /// Raw extracted text
    pub text: String,

    /// Page number, 1-based; `None` for files without pages
    pub page_number: Option<u32>,
}

impl SourcePage {
    pub fn new(text: impl Into<String>, page_number: Option<u32>) -> Self {
        Self {
            text: text.into(),
            page_number,
        }
    }
}

/// A loaded file, ready for splitting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Path the file was loaded from
    pub path: String,

    /// Pages in document order
    pub pages: Vec<SourcePage>,
}

impl SourceDocument {
    /// Create a document with no pages
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            pages: Vec::new(),
        }
    }

    /// Add a page
    pub fn with_page(mut self, page: SourcePage) -> Self {
        self.pages.push(page);
        self
    }

    /// Total character count over all pages
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }
}

/// Provenance carried by every chunk and indexed vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source file path
    pub source: String,

    /// Page number (if applicable)
    pub page: Option<u32>,

    /// Character offset of the chunk within its source page
    pub start_index: usize,
}

/// A bounded, possibly overlapping piece of a source page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Text content
    pub text: String,

    /// Provenance
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// One hit returned by a similarity search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Chunk text
    pub text: String,

    /// Original chunk metadata
    pub metadata: ChunkMetadata,

    /// 1-based rank in similarity order
    pub rank: usize,

    /// Cosine similarity reported by the index
    pub score: f32,
}

/// A source citation appended to an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based rank of the retrieved chunk
    pub rank: usize,

    /// File name shown to the user
    pub file_name: String,

    /// Page number (if applicable)
    pub page: Option<u32>,
}

impl Citation {
    /// Build a citation from a retrieval result
    pub fn from_result(result: &RetrievalResult) -> Self {
        Self {
            rank: result.rank,
            file_name: display_file_name(&result.metadata.source),
            page: result.metadata.page,
        }
    }
}

impl std::fmt::Display for Citation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.page {
            Some(page) => write!(f, "Source {}: {} (Page {})", self.rank, self.file_name, page),
            None => write!(f, "Source {}: {} (Page N/A)", self.rank, self.file_name),
        }
    }
}

/// File name component of a source path, or the path itself
pub fn display_file_name(source: &str) -> String {
    Path::new(source)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| source.to_string())
}

// ============================================================================
// Chat Models
// ============================================================================

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Everything the language model sees for one turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Effective system instruction
    pub system: String,

    /// Prior turns of the conversation, oldest first
    pub history: Vec<ChatMessage>,

    /// The current user query
    pub query: String,
}

impl ChatRequest {
    /// Flatten into the ordered message list sent to chat-completion APIs
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if !self.system.is_empty() {
            messages.push(ChatMessage::system(self.system.clone()));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(self.query.clone()));
        messages
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for LLM clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate the assistant reply for a chat turn
    async fn chat(&self, request: &ChatRequest) -> Result<String>;

    /// Model name for logging
    fn model(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn result(rank: usize, source: &str, page: Option<u32>) -> RetrievalResult {
        RetrievalResult {
            text: "text".to_string(),
            metadata: ChunkMetadata {
                source: source.to_string(),
                page,
                start_index: 0,
            },
            rank,
            score: 0.9,
        }
    }

    #[test]
    fn test_citation_display_with_page() {
        let citation = Citation::from_result(&result(1, "/tmp/uploads/report.pdf", Some(3)));
        assert_eq!(citation.file_name, "report.pdf");
        assert_eq!(citation.to_string(), "Source 1: report.pdf (Page 3)");
    }

    #[test]
    fn test_citation_display_without_page() {
        let citation = Citation::from_result(&result(2, "notes.txt", None));
        assert_eq!(citation.to_string(), "Source 2: notes.txt (Page N/A)");
    }

    #[test]
    fn test_chat_request_message_order() {
        let request = ChatRequest {
            system: "be brief".to_string(),
            history: vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
            query: "what now?".to_string(),
        };

        let messages = request.to_messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[3], ChatMessage::user("what now?"));
    }

    #[test]
    fn test_chat_request_skips_empty_system() {
        let request = ChatRequest {
            system: String::new(),
            history: vec![],
            query: "q".to_string(),
        };
        assert_eq!(request.to_messages(), vec![ChatMessage::user("q")]);
    }

    #[test]
    fn test_source_document_char_count() {
        let doc = SourceDocument::new("a.txt")
            .with_page(SourcePage::new("héllo", Some(1)))
            .with_page(SourcePage::new("abc", Some(2)));
        assert_eq!(doc.char_count(), 8);
    }

    #[test]
    fn test_error_codes() {
        let err = DocChatError::UnsupportedOrCorruptFile {
            path: "x.pdf".to_string(),
            reason: "bad xref".to_string(),
        };
        assert_eq!(err.code(), "UNSUPPORTED_OR_CORRUPT_FILE");
        assert!(err.to_string().contains("x.pdf"));
        assert_eq!(
            DocChatError::VectorStore("down".into()).code(),
            "VECTOR_STORE_ERROR"
        );
    }
}
