//! SQLite chat history repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use docqa_core::error::DocqaError;
use docqa_core::service::ChatHistoryStore;
use docqa_core::types::{Message, Role};

use crate::db::Database;

/// Chat history stored in the `chat_messages` table.
///
/// Messages are ordered by their autoincrement id, so load order is append
/// order even when two messages share a timestamp.
#[derive(Debug, Clone)]
pub struct SqliteChatHistory {
    db: Arc<Database>,
}

impl SqliteChatHistory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// All messages for a session, oldest first.
    pub fn messages(&self, session_id: &str) -> Result<Vec<Message>, DocqaError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT role, content, created_at FROM chat_messages
                     WHERE session_id = ?1
                     ORDER BY id ASC",
                )
                .map_err(|e| DocqaError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![session_id], |row| {
                    let role: String = row.get(0)?;
                    let content: String = row.get(1)?;
                    let created_at: i64 = row.get(2)?;
                    Ok((role, content, created_at))
                })
                .map_err(|e| DocqaError::Storage(e.to_string()))?;

            let mut messages = Vec::new();
            for row in rows {
                let (role, content, created_at) =
                    row.map_err(|e| DocqaError::Storage(e.to_string()))?;
                let role = Role::parse(&role).ok_or_else(|| {
                    DocqaError::Storage(format!("unknown role in chat_messages: {}", role))
                })?;
                messages.push(Message {
                    role,
                    content,
                    created_at: DateTime::<Utc>::from_timestamp_millis(created_at)
                        .unwrap_or_default(),
                });
            }
            Ok(messages)
        })
    }

    /// Insert one message.
    pub fn insert(&self, session_id: &str, role: Role, content: &str) -> Result<(), DocqaError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_messages (session_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    session_id,
                    role.as_str(),
                    content,
                    Utc::now().timestamp_millis(),
                ],
            )
            .map_err(|e| DocqaError::Storage(format!("Failed to save message: {}", e)))?;
            Ok(())
        })
    }

    /// Number of messages stored for a session.
    pub fn count(&self, session_id: &str) -> Result<u64, DocqaError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM chat_messages WHERE session_id = ?1",
                    rusqlite::params![session_id],
                    |row| row.get(0),
                )
                .map_err(|e| DocqaError::Storage(e.to_string()))?;
            Ok(n as u64)
        })
    }

    /// Delete a session's messages. Returns the number removed.
    pub fn clear(&self, session_id: &str) -> Result<usize, DocqaError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM chat_messages WHERE session_id = ?1",
                rusqlite::params![session_id],
            )
            .map_err(|e| DocqaError::Storage(format!("Failed to clear session: {}", e)))
        })
    }
}

#[async_trait]
impl ChatHistoryStore for SqliteChatHistory {
    async fn load(&self, session_id: &str) -> Result<Vec<Message>, DocqaError> {
        let repo = self.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || repo.messages(&session_id))
            .await
            .map_err(|e| DocqaError::History(format!("history task failed: {}", e)))?
            .map_err(into_history)
    }

    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<(), DocqaError> {
        let repo = self.clone();
        let session_id = session_id.to_string();
        let content = content.to_string();
        tokio::task::spawn_blocking(move || repo.insert(&session_id, role, &content))
            .await
            .map_err(|e| DocqaError::History(format!("history task failed: {}", e)))?
            .map_err(into_history)
    }
}

fn into_history(err: DocqaError) -> DocqaError {
    match err {
        DocqaError::Storage(msg) => DocqaError::History(msg),
        other => other,
    }
}
