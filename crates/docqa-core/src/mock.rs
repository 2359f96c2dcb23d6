//! In-memory collaborator implementations.
//!
//! Used by tests across the workspace and by the `memory` history backend.
//! The document store and language model record every call so tests can
//! assert on what the orchestrator sent.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{DocqaError, Result};
use crate::service::{ChatHistoryStore, DocumentStore, LanguageModel, TokenStream};
use crate::types::{Message, RetrievedPassage, Role};

// ---------------------------------------------------------------------------
// InMemoryChatHistory
// ---------------------------------------------------------------------------

/// Chat history kept in a `HashMap` keyed by session id.
#[derive(Debug, Default)]
pub struct InMemoryChatHistory {
    sessions: Mutex<HashMap<String, Vec<Message>>>,
    fail_appends: bool,
}

impl InMemoryChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a session with existing messages.
    pub fn with_messages(self, session_id: &str, messages: Vec<Message>) -> Self {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(session_id.to_string(), messages);
        }
        self
    }

    /// Make every append fail with a history error.
    pub fn failing_appends(mut self) -> Self {
        self.fail_appends = true;
        self
    }

    /// Snapshot of a session's messages.
    pub fn messages(&self, session_id: &str) -> Vec<Message> {
        self.sessions
            .lock()
            .ok()
            .and_then(|s| s.get(session_id).cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatHistoryStore for InMemoryChatHistory {
    async fn load(&self, session_id: &str) -> Result<Vec<Message>> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|e| DocqaError::History(format!("history lock poisoned: {}", e)))?;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<()> {
        if self.fail_appends {
            return Err(DocqaError::History("append rejected".to_string()));
        }
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| DocqaError::History(format!("history lock poisoned: {}", e)))?;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .push(Message {
                role,
                content: content.to_string(),
                created_at: Utc::now(),
            });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StaticDocumentStore
// ---------------------------------------------------------------------------

/// Document store returning a fixed list of passages for every query.
#[derive(Debug, Default)]
pub struct StaticDocumentStore {
    passages: Vec<RetrievedPassage>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl StaticDocumentStore {
    pub fn new(passages: Vec<RetrievedPassage>) -> Self {
        Self {
            passages,
            ..Self::default()
        }
    }

    /// A store whose every retrieval fails.
    pub fn unavailable() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Queries received so far, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for StaticDocumentStore {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>> {
        if let Ok(mut q) = self.queries.lock() {
            q.push(query.to_string());
        }
        if self.fail {
            return Err(DocqaError::Search("document store unavailable".to_string()));
        }
        Ok(self.passages.clone())
    }
}

// ---------------------------------------------------------------------------
// ScriptedLanguageModel
// ---------------------------------------------------------------------------

/// Language model replaying a fixed completion and token sequence.
#[derive(Debug, Default)]
pub struct ScriptedLanguageModel {
    completion: String,
    tokens: Vec<String>,
    /// Yield an error after this many tokens.
    fail_stream_after: Option<usize>,
    fail_complete: bool,
    complete_prompts: Mutex<Vec<String>>,
    stream_prompts: Mutex<Vec<String>>,
}

impl ScriptedLanguageModel {
    pub fn new(completion: impl Into<String>, tokens: &[&str]) -> Self {
        Self {
            completion: completion.into(),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_stream_after(mut self, tokens: usize) -> Self {
        self.fail_stream_after = Some(tokens);
        self
    }

    pub fn failing_complete(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    /// Prompts passed to [`LanguageModel::complete`].
    pub fn complete_prompts(&self) -> Vec<String> {
        self.complete_prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Prompts passed to [`LanguageModel::stream`].
    pub fn stream_prompts(&self) -> Vec<String> {
        self.stream_prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut p) = self.complete_prompts.lock() {
            p.push(prompt.to_string());
        }
        if self.fail_complete {
            return Err(DocqaError::Llm("completion failed".to_string()));
        }
        Ok(self.completion.clone())
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        if let Ok(mut p) = self.stream_prompts.lock() {
            p.push(prompt.to_string());
        }
        let mut items: Vec<Result<String>> = Vec::new();
        for (i, token) in self.tokens.iter().enumerate() {
            if self.fail_stream_after == Some(i) {
                break;
            }
            items.push(Ok(token.clone()));
        }
        if self.fail_stream_after.is_some() {
            items.push(Err(DocqaError::Llm("stream interrupted".to_string())));
        }
        Ok(Box::pin(tokio_stream::iter(items)))
    }
}
