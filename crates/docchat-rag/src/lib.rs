//! DocChat RAG - Retrieval-augmented answering
//!
//! This crate ties the pipeline together:
//! - `ingest`: load a file, split it and index the chunks
//! - `RagEngine`: retrieve context, compose the system instruction,
//!   call the language model and append source citations
//! - `cache`: embedding cache in front of the remote embedding service
//! - `llm`: chat-completion clients
//! - `pipeline`: backend selection from `AppConfig`
//!
//! Author: hephaex@gmail.com

use docchat_core::{
    ChatMessage, ChatRequest, ChatSettings, Citation, DocChatError, LlmClient, Persona, RagConfig,
    Result, RetrievalResult, SessionStore,
};
use docchat_vector::VectorIndex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

pub mod cache;
pub mod ingest;
pub mod llm;
pub mod pipeline;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use cache::{CacheConfig, CacheStats, CacheStatsReport, CachedEmbedding};
pub use ingest::{upload_message, IngestReport, IngestService};
pub use llm::{create_llm_client, OllamaClient, OpenAiClient};
pub use pipeline::Pipeline;

// ============================================================================
// Prompt Constants
// ============================================================================

/// Exact sentence the model must reply with when the context lacks the answer
pub const REFUSAL_SENTENCE: &str = "I cannot find the answer in the uploaded document.";

/// System instruction used in strict mode when context was retrieved
pub const STRICT_INSTRUCTION: &str = "You are a document question-answering assistant. \
Answer the question using ONLY the context provided below. \
Do not use prior knowledge. \
If the answer is not contained in the context, reply exactly: \
\"I cannot find the answer in the uploaded document.\"";

/// Label that opens the context block
pub const CONTEXT_LABEL: &str = "Relevant Context from File";

/// Marker appended when no retrieval took place
pub const LLM_SOURCE_MARKER: &str = "Source: LLM";

// ============================================================================
// Request / Response
// ============================================================================

/// One chat turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The user's question
    pub query: String,

    /// Strict grounding; falls back to the configured default
    #[serde(default)]
    pub strict: Option<bool>,

    /// Persona; falls back to the configured default
    #[serde(default)]
    pub persona: Option<Persona>,

    /// Conversation to read history from and append to
    #[serde(default)]
    pub session_id: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn persona(mut self, persona: Persona) -> Self {
        self.persona = Some(persona);
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Apply this turn's overrides on top of the configured defaults
    pub fn settings(&self, defaults: ChatSettings) -> ChatSettings {
        ChatSettings {
            persona: self.persona.unwrap_or(defaults.persona),
            strict_mode: self.strict.unwrap_or(defaults.strict_mode),
        }
    }
}

/// Result of one chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagAnswer {
    /// Answer with the sources section appended, as shown to the user
    pub text: String,

    /// Raw model answer
    pub answer: String,

    /// Citations in retrieval rank order
    pub citations: Vec<Citation>,

    /// Whether any chunk was retrieved
    pub used_retrieval: bool,

    /// Model that produced the answer
    pub model: String,

    /// Wall-clock time for the turn
    pub processing_time_ms: u64,
}

// ============================================================================
// Prompt Assembly
// ============================================================================

/// Context block for the system instruction; empty when nothing was retrieved
pub fn build_context(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return String::new();
    }
    let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
    format!("{CONTEXT_LABEL}:\n{}", texts.join("\n\n"))
}

/// Builder for the effective system instruction
#[derive(Debug, Default)]
pub struct PromptBuilder {
    base: String,
    context: String,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instruction that opens the prompt
    pub fn base(mut self, instruction: impl Into<String>) -> Self {
        self.base = instruction.into();
        self
    }

    /// Context block, possibly empty
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn build(self) -> String {
        match (self.base.is_empty(), self.context.is_empty()) {
            (_, true) => self.base,
            (true, false) => self.context,
            (false, false) => format!("{}\n\n{}", self.base, self.context),
        }
    }
}

/// Effective system instruction for a turn
///
/// The strict instruction applies only when there is context to ground on;
/// otherwise the persona prompt is used.
pub fn compose_system_instruction(
    settings: &ChatSettings,
    results: &[RetrievalResult],
) -> String {
    let base = if settings.strict_mode && !results.is_empty() {
        STRICT_INSTRUCTION
    } else {
        settings.persona.prompt()
    };

    PromptBuilder::new()
        .base(base)
        .context(build_context(results))
        .build()
}

/// Append the sources section (or the LLM marker) to an answer
pub fn format_sources(answer: &str, citations: &[Citation]) -> String {
    if citations.is_empty() {
        return format!("{answer}\n\n{LLM_SOURCE_MARKER}");
    }
    let lines: Vec<String> = citations.iter().map(|c| c.to_string()).collect();
    format!("{answer}\n\n**Sources:**\n{}", lines.join("\n"))
}

// ============================================================================
// RAG Engine
// ============================================================================

/// Answering engine over one vector index and one session store
pub struct RagEngine {
    index: Arc<VectorIndex>,
    llm: Arc<dyn LlmClient>,
    sessions: Arc<dyn SessionStore>,
    config: RagConfig,
}

impl RagEngine {
    pub fn new(
        index: Arc<VectorIndex>,
        llm: Arc<dyn LlmClient>,
        sessions: Arc<dyn SessionStore>,
        config: RagConfig,
    ) -> Self {
        Self {
            index,
            llm,
            sessions,
            config,
        }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Answer one query
    ///
    /// History is read before the model call; the user message and the final
    /// text are appended only after the model succeeds.
    pub async fn answer(&self, request: &QueryRequest) -> Result<RagAnswer> {
        let start_time = Instant::now();

        let query = request.query.trim();
        if query.is_empty() {
            return Err(DocChatError::Validation("Query cannot be empty".to_string()));
        }

        let settings = request.settings(self.config.chat_settings());

        let results = self.retrieve(query).await?;
        tracing::debug!(
            results = results.len(),
            strict = settings.strict_mode,
            persona = %settings.persona,
            "Retrieval completed"
        );

        let history = match &request.session_id {
            Some(session_id) => self.sessions.history(session_id).await?,
            None => Vec::new(),
        };

        let chat = ChatRequest {
            system: compose_system_instruction(&settings, &results),
            history,
            query: query.to_string(),
        };

        tracing::info!(
            model = self.llm.model(),
            system_chars = chat.system.len(),
            history = chat.history.len(),
            "Calling LLM"
        );
        let answer = self.llm.chat(&chat).await?;
        tracing::info!(chars = answer.len(), "LLM response received");

        let citations: Vec<Citation> = results.iter().map(Citation::from_result).collect();
        let text = format_sources(&answer, &citations);

        if let Some(session_id) = &request.session_id {
            self.sessions
                .append_all(
                    session_id,
                    &[ChatMessage::user(query), ChatMessage::assistant(text.clone())],
                )
                .await?;
        }

        Ok(RagAnswer {
            text,
            answer,
            used_retrieval: !citations.is_empty(),
            citations,
            model: self.llm.model().to_string(),
            processing_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    /// Explain a topic in simple terms, without retrieval or history
    pub async fn explain(&self, topic: &str) -> Result<String> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(DocChatError::Validation("Topic cannot be empty".to_string()));
        }

        let chat = ChatRequest {
            system: Persona::Eli5.prompt().to_string(),
            history: Vec::new(),
            query: format!("Tell me about {topic}."),
        };
        self.llm.chat(&chat).await
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievalResult>> {
        if self.index.point_count().await? == 0 {
            return Ok(Vec::new());
        }
        self.index.similarity_search(query, self.config.top_k).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLlm;
    use docchat_core::{Chunk, ChunkMetadata, IndexMode, InMemorySessionStore};
    use docchat_vector::testing::KeywordEmbedding;
    use docchat_vector::InMemoryVectorStore;

    fn result(rank: usize, text: &str, source: &str, page: Option<u32>) -> RetrievalResult {
        RetrievalResult {
            text: text.to_string(),
            metadata: ChunkMetadata {
                source: source.to_string(),
                page,
                start_index: 0,
            },
            rank,
            score: 1.0 / rank as f32,
        }
    }

    fn chunk(text: &str, source: &str, page: Option<u32>) -> Chunk {
        Chunk::new(
            text,
            ChunkMetadata {
                source: source.to_string(),
                page,
                start_index: 0,
            },
        )
    }

    fn index() -> Arc<VectorIndex> {
        Arc::new(VectorIndex::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(KeywordEmbedding::new()),
            "rag_test",
            IndexMode::Accumulate,
        ))
    }

    async fn seeded_index() -> Arc<VectorIndex> {
        let index = index();
        index
            .upsert(&[
                chunk("the refund window is thirty days", "/uploads/policy.pdf", Some(2)),
                chunk("refund requests need a receipt", "/uploads/policy.pdf", Some(5)),
                chunk("shipping takes five days", "notes.txt", None),
                chunk("our office cat is named Biscuit", "notes.txt", None),
            ])
            .await
            .unwrap();
        index
    }

    fn engine(
        index: Arc<VectorIndex>,
        llm: Arc<MockLlm>,
    ) -> (RagEngine, Arc<InMemorySessionStore>) {
        let sessions = Arc::new(InMemorySessionStore::new());
        let engine = RagEngine::new(index, llm, sessions.clone(), RagConfig::default());
        (engine, sessions)
    }

    #[test]
    fn test_strict_instruction_contains_refusal() {
        assert!(STRICT_INSTRUCTION.contains(REFUSAL_SENTENCE));
    }

    #[test]
    fn test_build_context() {
        assert_eq!(build_context(&[]), "");

        let context = build_context(&[
            result(1, "first", "a.pdf", Some(1)),
            result(2, "second", "a.pdf", Some(2)),
        ]);
        assert_eq!(context, "Relevant Context from File:\nfirst\n\nsecond");
    }

    #[test]
    fn test_request_settings_override_defaults() {
        let mut config = RagConfig::default();
        config.strict_mode = true;
        config.default_persona = Persona::Tutor;
        let defaults = config.chat_settings();

        assert_eq!(QueryRequest::new("q").settings(defaults), defaults);

        let overridden = QueryRequest::new("q")
            .strict(false)
            .persona(Persona::Eli5)
            .settings(defaults);
        assert_eq!(
            overridden,
            ChatSettings {
                persona: Persona::Eli5,
                strict_mode: false,
            }
        );
    }

    #[test]
    fn test_compose_system_instruction() {
        let results = vec![result(1, "ctx", "a.pdf", Some(1))];

        let tutor = ChatSettings {
            persona: Persona::Tutor,
            strict_mode: true,
        };
        let strict = compose_system_instruction(&tutor, &results);
        assert!(strict.starts_with(STRICT_INSTRUCTION));
        assert!(strict.ends_with("Relevant Context from File:\nctx"));

        let relaxed = compose_system_instruction(
            &ChatSettings {
                strict_mode: false,
                ..tutor
            },
            &results,
        );
        assert!(relaxed.starts_with(Persona::Tutor.prompt()));
        assert!(!relaxed.contains(REFUSAL_SENTENCE));

        let concise = ChatSettings {
            persona: Persona::Concise,
            strict_mode: true,
        };
        let empty = compose_system_instruction(&concise, &[]);
        assert_eq!(empty, Persona::Concise.prompt());
    }

    #[test]
    fn test_format_sources() {
        assert_eq!(format_sources("Hi", &[]), "Hi\n\nSource: LLM");

        let citations = vec![
            Citation::from_result(&result(1, "x", "/tmp/a.pdf", Some(4))),
            Citation::from_result(&result(2, "y", "b.txt", None)),
        ];
        assert_eq!(
            format_sources("Hi", &citations),
            "Hi\n\n**Sources:**\nSource 1: a.pdf (Page 4)\nSource 2: b.txt (Page N/A)"
        );
    }

    #[test]
    fn test_prompt_builder() {
        assert_eq!(PromptBuilder::new().base("a").build(), "a");
        assert_eq!(PromptBuilder::new().context("c").build(), "c");
        assert_eq!(PromptBuilder::new().base("a").context("c").build(), "a\n\nc");
    }

    #[tokio::test]
    async fn test_strict_answer_sends_refusal_instruction() {
        let llm = Arc::new(MockLlm::replying(REFUSAL_SENTENCE));
        let (engine, _) = engine(seeded_index().await, llm.clone());

        let answer = engine
            .answer(&QueryRequest::new("Who is the CEO?").strict(true))
            .await
            .unwrap();

        let sent = llm.last_request().unwrap();
        assert!(sent.system.contains(REFUSAL_SENTENCE));
        assert!(sent.system.contains("Relevant Context from File:"));
        assert_eq!(sent.query, "Who is the CEO?");
        assert!(answer.text.starts_with(REFUSAL_SENTENCE));
        assert!(answer.used_retrieval);
    }

    #[tokio::test]
    async fn test_citations_follow_rank_order() {
        let index = seeded_index().await;
        let expected = index.similarity_search("refund window", 3).await.unwrap();

        let llm = Arc::new(MockLlm::replying("Thirty days."));
        let (engine, _) = engine(index, llm);
        let answer = engine
            .answer(&QueryRequest::new("refund window"))
            .await
            .unwrap();

        assert_eq!(answer.citations.len(), 3);
        for (citation, hit) in answer.citations.iter().zip(&expected) {
            assert_eq!(citation.rank, hit.rank);
            assert_eq!(citation.page, hit.metadata.page);
        }
        assert_eq!(answer.citations[0].file_name, "policy.pdf");
        assert_eq!(answer.citations[0].page, Some(2));
        assert!(answer
            .text
            .contains("**Sources:**\nSource 1: policy.pdf (Page 2)\nSource 2:"));
    }

    #[tokio::test]
    async fn test_empty_index_uses_persona_and_llm_marker() {
        let llm = Arc::new(MockLlm::replying("Paris."));
        let (engine, _) = engine(index(), llm.clone());

        let answer = engine
            .answer(
                &QueryRequest::new("Capital of France?")
                    .strict(true)
                    .persona(Persona::Eli5),
            )
            .await
            .unwrap();

        assert_eq!(answer.text, "Paris.\n\nSource: LLM");
        assert!(!answer.used_retrieval);
        assert_eq!(llm.last_request().unwrap().system, Persona::Eli5.prompt());
    }

    #[tokio::test]
    async fn test_session_history_roundtrip() {
        let llm = Arc::new(MockLlm::replying("Sure."));
        let (engine, sessions) = engine(index(), llm.clone());

        engine
            .answer(&QueryRequest::new("first question").session("s1"))
            .await
            .unwrap();
        engine
            .answer(&QueryRequest::new("second question").session("s1"))
            .await
            .unwrap();

        let sent = llm.last_request().unwrap();
        assert_eq!(sent.history.len(), 2);
        assert_eq!(sent.history[0], ChatMessage::user("first question"));
        assert_eq!(sent.history[1].content, "Sure.\n\nSource: LLM");

        assert_eq!(sessions.history("s1").await.unwrap().len(), 4);
        assert_eq!(
            sessions.subject("s1").await.unwrap().as_deref(),
            Some("first question")
        );
    }

    #[tokio::test]
    async fn test_failed_llm_leaves_session_untouched() {
        let llm = Arc::new(MockLlm::failing());
        let (engine, sessions) = engine(seeded_index().await, llm);

        let err = engine
            .answer(&QueryRequest::new("refund").session("s2"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "LANGUAGE_MODEL_SERVICE_ERROR");
        assert!(sessions.history("s2").await.unwrap().is_empty());
    }

    /// Session store that records write batches and can refuse them
    #[derive(Default)]
    struct BatchStore {
        inner: InMemorySessionStore,
        batches: std::sync::Mutex<Vec<usize>>,
        reject: bool,
    }

    #[async_trait::async_trait]
    impl SessionStore for BatchStore {
        async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
            self.inner.history(session_id).await
        }

        async fn records(&self, session_id: &str) -> Result<Vec<docchat_core::SessionRecord>> {
            self.inner.records(session_id).await
        }

        async fn append_all(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()> {
            self.batches.lock().unwrap().push(messages.len());
            if self.reject {
                return Err(DocChatError::StorageConnection("connection reset".to_string()));
            }
            self.inner.append_all(session_id, messages).await
        }

        async fn subject(&self, session_id: &str) -> Result<Option<String>> {
            self.inner.subject(session_id).await
        }

        async fn list_sessions(&self, limit: i64) -> Result<Vec<docchat_core::SessionSummary>> {
            self.inner.list_sessions(limit).await
        }

        async fn delete_session(&self, session_id: &str) -> Result<u64> {
            self.inner.delete_session(session_id).await
        }

        fn backend(&self) -> &'static str {
            "batch"
        }
    }

    #[tokio::test]
    async fn test_turn_is_stored_in_one_write() {
        let store = Arc::new(BatchStore::default());
        let engine = RagEngine::new(
            seeded_index().await,
            Arc::new(MockLlm::replying("Thirty days.")),
            store.clone(),
            RagConfig::default(),
        );

        engine
            .answer(&QueryRequest::new("refund window").session("s3"))
            .await
            .unwrap();

        assert_eq!(*store.batches.lock().unwrap(), vec![2]);
        assert_eq!(store.history("s3").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_session_write_stores_nothing() {
        let store = Arc::new(BatchStore {
            reject: true,
            ..Default::default()
        });
        let engine = RagEngine::new(
            seeded_index().await,
            Arc::new(MockLlm::replying("Thirty days.")),
            store.clone(),
            RagConfig::default(),
        );

        let err = engine
            .answer(&QueryRequest::new("refund window").session("s4"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "STORAGE_CONNECTION_ERROR");
        assert!(store.history("s4").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let llm = Arc::new(MockLlm::replying("unused"));
        let (engine, _) = engine(index(), llm.clone());

        let err = engine.answer(&QueryRequest::new("   ")).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(llm.request_count(), 0);
    }

    #[tokio::test]
    async fn test_config_defaults_apply() {
        let llm = Arc::new(MockLlm::replying("ok"));
        let config = RagConfig {
            strict_mode: true,
            top_k: 1,
            ..RagConfig::default()
        };
        let engine = RagEngine::new(
            seeded_index().await,
            llm.clone(),
            Arc::new(InMemorySessionStore::new()),
            config,
        );

        let answer = engine.answer(&QueryRequest::new("refund")).await.unwrap();
        assert_eq!(answer.citations.len(), 1);
        assert!(llm.last_request().unwrap().system.starts_with(STRICT_INSTRUCTION));
    }

    #[tokio::test]
    async fn test_explain_uses_eli5_persona() {
        let llm = Arc::new(MockLlm::replying("Stars are big lamps."));
        let (engine, _) = engine(index(), llm.clone());

        let text = engine.explain("stars").await.unwrap();
        assert_eq!(text, "Stars are big lamps.");

        let sent = llm.last_request().unwrap();
        assert_eq!(sent.system, Persona::Eli5.prompt());
        assert_eq!(sent.query, "Tell me about stars.");
        assert!(engine.explain(" ").await.is_err());
    }
}
