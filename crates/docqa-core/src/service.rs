//! Collaborator traits for the three external services the orchestrator
//! talks to.
//!
//! Concrete clients live in their own crates (`docqa-elastic`,
//! `docqa-storage`, `docqa-llm`); the host application constructs them and
//! hands them to the orchestrator as `Arc<dyn ...>`.

use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;

use crate::error::Result;
use crate::types::{Message, RetrievedPassage, Role};

/// Lazy, finite, non-restartable sequence of generated text fragments.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A search index returning passages relevant to a query.
///
/// Ordering and result count are the store's own policy; callers treat the
/// returned sequence as already ranked.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>>;
}

/// Per-session ordered message log.
#[async_trait]
pub trait ChatHistoryStore: Send + Sync {
    /// All messages of the session in append order. Unknown sessions yield
    /// an empty list.
    async fn load(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Append one message. Creates the session implicitly.
    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<()>;

    async fn append_user(&self, session_id: &str, content: &str) -> Result<()> {
        self.append(session_id, Role::User, content).await
    }

    async fn append_assistant(&self, session_id: &str, content: &str) -> Result<()> {
        self.append(session_id, Role::Assistant, content).await
    }
}

/// A hosted language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Single-shot completion.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Streaming completion. The returned stream may yield an `Err` item
    /// mid-way, after which it ends.
    async fn stream(&self, prompt: &str) -> Result<TokenStream>;
}
