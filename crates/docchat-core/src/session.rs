//! Chat session storage
//!
//! Every message of a conversation is one row keyed by session id. The
//! session subject is taken from the first user message and copied onto
//! every later row so listing sessions needs no join.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use crate::{ChatMessage, DocChatError, Result, Role};

/// Maximum subject length in characters, before the ellipsis
pub const SUBJECT_MAX_CHARS: usize = 50;

/// One stored message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub session_id: String,
    pub message: ChatMessage,
    pub created_at: DateTime<Utc>,
    pub subject: Option<String>,
}

/// Overview of one session for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub subject: Option<String>,
    pub message_count: i64,
    pub last_activity: DateTime<Utc>,
}

/// Derive a short subject line from a user message
pub fn derive_subject(content: &str) -> Option<String> {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.chars().count() <= SUBJECT_MAX_CHARS {
        return Some(collapsed);
    }
    let truncated: String = collapsed.chars().take(SUBJECT_MAX_CHARS).collect();
    Some(format!("{}...", truncated.trim_end()))
}

/// Subject for a new row: the existing one, else derived from a user message
fn next_subject(existing: Option<String>, message: &ChatMessage) -> Option<String> {
    existing.or_else(|| match message.role {
        Role::User => derive_subject(&message.content),
        _ => None,
    })
}

/// Session persistence used by the answering engine and the API
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Messages of a session, oldest first
    async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>>;

    /// Full rows of a session, oldest first
    async fn records(&self, session_id: &str) -> Result<Vec<SessionRecord>>;

    /// Append messages in order; either all rows are stored or none
    async fn append_all(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()>;

    /// Append one message
    async fn append(&self, session_id: &str, message: &ChatMessage) -> Result<()> {
        self.append_all(session_id, std::slice::from_ref(message)).await
    }

    /// Subject of a session, if one has been set
    async fn subject(&self, session_id: &str) -> Result<Option<String>>;

    /// Most recently active sessions first
    async fn list_sessions(&self, limit: i64) -> Result<Vec<SessionSummary>>;

    /// Delete every row of a session, returning how many were removed
    async fn delete_session(&self, session_id: &str) -> Result<u64>;

    /// Backend name for logs and readiness reports
    fn backend(&self) -> &'static str;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// PostgreSQL-backed session store
pub struct PgSessionStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: i64,
    session_id: String,
    message: Json<ChatMessage>,
    created_at: DateTime<Utc>,
    subject: Option<String>,
}

impl From<MessageRow> for SessionRecord {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            message: row.message.0,
            created_at: row.created_at,
            subject: row.subject,
        }
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    session_id: String,
    subject: Option<String>,
    message_count: i64,
    last_activity: DateTime<Utc>,
}

impl From<SummaryRow> for SessionSummary {
    fn from(row: SummaryRow) -> Self {
        Self {
            session_id: row.session_id,
            subject: row.subject,
            message_count: row.message_count,
            last_activity: row.last_activity,
        }
    }
}

const SUBJECT_QUERY: &str = r#"
    SELECT subject FROM chat_messages
    WHERE session_id = $1 AND subject IS NOT NULL
    ORDER BY id ASC
    LIMIT 1
"#;

fn db_error(err: sqlx::Error) -> DocChatError {
    DocChatError::StorageConnection(err.to_string())
}

impl PgSessionStore {
    /// Connect to PostgreSQL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db_error)?;

        Ok(Self { pool })
    }

    /// Create the messages table if it does not exist
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id BIGSERIAL PRIMARY KEY,
                session_id TEXT NOT NULL,
                message JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                subject TEXT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages (session_id, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        tracing::debug!("chat_messages table ready");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        Ok(self
            .records(session_id)
            .await?
            .into_iter()
            .map(|r| r.message)
            .collect())
    }

    async fn records(&self, session_id: &str) -> Result<Vec<SessionRecord>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, message, created_at, subject
            FROM chat_messages
            WHERE session_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn append_all(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let row: Option<(Option<String>,)> = sqlx::query_as(SUBJECT_QUERY)
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;
        let mut subject = row.and_then(|(subject,)| subject);

        for message in messages {
            subject = next_subject(subject, message);
            sqlx::query(
                r#"
                INSERT INTO chat_messages (session_id, message, subject)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(session_id)
            .bind(Json(message))
            .bind(subject.clone())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        // Dropping an uncommitted transaction rolls it back
        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn subject(&self, session_id: &str) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> = sqlx::query_as(SUBJECT_QUERY)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(row.and_then(|(subject,)| subject))
    }

    async fn list_sessions(&self, limit: i64) -> Result<Vec<SessionSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT session_id,
                   MAX(subject) AS subject,
                   COUNT(*) AS message_count,
                   MAX(created_at) AS last_activity
            FROM chat_messages
            GROUP BY session_id
            ORDER BY last_activity DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_session(&self, session_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local session store for tests and single-user runs
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Vec<SessionRecord>>>,
    next_id: AtomicI64,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .map(|rows| rows.iter().map(|r| r.message.clone()).collect())
            .unwrap_or_default())
    }

    async fn records(&self, session_id: &str) -> Result<Vec<SessionRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn append_all(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut sessions = self.sessions.write().await;
        let rows = sessions.entry(session_id.to_string()).or_default();
        let mut subject = rows.iter().find_map(|r| r.subject.clone());

        for message in messages {
            subject = next_subject(subject, message);
            rows.push(SessionRecord {
                id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
                session_id: session_id.to_string(),
                message: message.clone(),
                created_at: Utc::now(),
                subject: subject.clone(),
            });
        }
        Ok(())
    }

    async fn subject(&self, session_id: &str) -> Result<Option<String>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .and_then(|rows| rows.iter().find_map(|r| r.subject.clone())))
    }

    async fn list_sessions(&self, limit: i64) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .iter()
            .filter_map(|(id, rows)| {
                let last = rows.last()?;
                Some(SessionSummary {
                    session_id: id.clone(),
                    subject: rows.iter().find_map(|r| r.subject.clone()),
                    message_count: rows.len() as i64,
                    last_activity: last.created_at,
                })
            })
            .collect();

        // Ties on timestamp fall back to insertion order via the row id
        summaries.sort_by(|a, b| {
            b.last_activity.cmp(&a.last_activity).then_with(|| {
                let last_id = |s: &SessionSummary| {
                    sessions
                        .get(&s.session_id)
                        .and_then(|rows| rows.last())
                        .map(|r| r.id)
                        .unwrap_or_default()
                };
                last_id(b).cmp(&last_id(a))
            })
        });
        summaries.truncate(limit.max(0) as usize);
        Ok(summaries)
    }

    async fn delete_session(&self, session_id: &str) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .remove(session_id)
            .map(|rows| rows.len() as u64)
            .unwrap_or(0))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_subject_collapses_whitespace() {
        assert_eq!(
            derive_subject("  What is   the\nrefund policy? "),
            Some("What is the refund policy?".to_string())
        );
        assert_eq!(derive_subject(" \n\t "), None);
    }

    #[test]
    fn test_derive_subject_truncates() {
        let long = "word ".repeat(30);
        let subject = derive_subject(&long).unwrap();
        assert!(subject.ends_with("..."));
        assert!(subject.chars().count() <= SUBJECT_MAX_CHARS + 3);
    }

    #[test]
    fn test_subject_taken_from_first_user_message() {
        tokio_test::block_on(async {
            let store = InMemorySessionStore::new();
            store
                .append("s1", &ChatMessage::assistant("Welcome!"))
                .await
                .unwrap();
            assert_eq!(store.subject("s1").await.unwrap(), None);

            store
                .append("s1", &ChatMessage::user("Summarise chapter two"))
                .await
                .unwrap();
            store
                .append("s1", &ChatMessage::user("And chapter three?"))
                .await
                .unwrap();

            let records = store.records("s1").await.unwrap();
            assert_eq!(records.len(), 3);
            assert_eq!(records[0].subject, None);
            assert_eq!(records[1].subject.as_deref(), Some("Summarise chapter two"));
            assert_eq!(records[2].subject.as_deref(), Some("Summarise chapter two"));
        });
    }

    #[test]
    fn test_append_all_keeps_order_and_subject() {
        tokio_test::block_on(async {
            let store = InMemorySessionStore::new();
            store
                .append_all(
                    "turn",
                    &[
                        ChatMessage::user("Where is the index?"),
                        ChatMessage::assistant("Page 3."),
                    ],
                )
                .await
                .unwrap();
            store.append_all("turn", &[]).await.unwrap();

            let records = store.records("turn").await.unwrap();
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].message, ChatMessage::user("Where is the index?"));
            assert_eq!(records[1].subject.as_deref(), Some("Where is the index?"));
            assert!(records[0].id < records[1].id);
            assert!(store.history("untouched").await.unwrap().is_empty());
        });
    }

    #[test]
    fn test_history_order_and_isolation() {
        tokio_test::block_on(async {
            let store = InMemorySessionStore::new();
            store.append("a", &ChatMessage::user("q1")).await.unwrap();
            store.append("b", &ChatMessage::user("other")).await.unwrap();
            store.append("a", &ChatMessage::assistant("r1")).await.unwrap();

            let history = store.history("a").await.unwrap();
            assert_eq!(
                history,
                vec![ChatMessage::user("q1"), ChatMessage::assistant("r1")]
            );
            assert!(store.history("missing").await.unwrap().is_empty());
        });
    }

    #[test]
    fn test_list_and_delete_sessions() {
        tokio_test::block_on(async {
            let store = InMemorySessionStore::new();
            store.append("old", &ChatMessage::user("first")).await.unwrap();
            store.append("new", &ChatMessage::user("second")).await.unwrap();
            store.append("new", &ChatMessage::assistant("ok")).await.unwrap();

            let sessions = store.list_sessions(10).await.unwrap();
            assert_eq!(sessions.len(), 2);
            assert_eq!(sessions[0].session_id, "new");
            assert_eq!(sessions[0].message_count, 2);

            assert_eq!(store.list_sessions(1).await.unwrap().len(), 1);

            assert_eq!(store.delete_session("new").await.unwrap(), 2);
            assert_eq!(store.delete_session("new").await.unwrap(), 0);
            assert_eq!(store.list_sessions(10).await.unwrap().len(), 1);
        });
    }

    #[test]
    #[ignore] // Requires running PostgreSQL
    fn test_pg_session_store_roundtrip() {
        tokio_test::block_on(async {
            let url = std::env::var("DATABASE_URL").unwrap();
            let store = PgSessionStore::new(&url, 2).await.unwrap();
            store.migrate().await.unwrap();

            let session = uuid::Uuid::new_v4().to_string();
            store
                .append_all(
                    &session,
                    &[ChatMessage::user("hello there"), ChatMessage::assistant("hi")],
                )
                .await
                .unwrap();

            assert_eq!(store.history(&session).await.unwrap().len(), 2);
            assert_eq!(
                store.subject(&session).await.unwrap().as_deref(),
                Some("hello there")
            );
            assert_eq!(store.delete_session(&session).await.unwrap(), 2);
        });
    }
}
