//! Question-answer orchestrator: condense, retrieve, generate, persist.
//!
//! Each call to [`QaOrchestrator::handle`] spawns one producer task that
//! runs the pipeline sequentially and pushes events onto a bounded channel.
//! The consumer reads the other end as a stream. Dropping the stream is the
//! cancellation signal: the producer notices on its next send and stops
//! without touching chat history.

use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, warn};

use docqa_core::service::{ChatHistoryStore, DocumentStore, LanguageModel};
use docqa_core::types::{Message, StreamEvent};
use docqa_llm::prompt::{PromptRenderer, CONDENSE_QUESTION_PROMPT, RAG_PROMPT};

use crate::error::ChatError;

/// Events buffered between the producer task and the consumer.
const EVENT_BUFFER: usize = 32;

/// Answer events for one question, consumed once.
///
/// A successful stream ends with [`StreamEvent::Done`]. A failed one ends
/// with a single `Err` item instead.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ChatError>> + Send>>;

/// Why a run stopped before completing.
enum Halt {
    /// The consumer dropped the stream.
    Disconnected,
    Failed(ChatError),
}

impl From<ChatError> for Halt {
    fn from(err: ChatError) -> Self {
        Halt::Failed(err)
    }
}

/// Coordinates the document store, chat history and language model to
/// answer one question at a time per call. Shared across requests.
pub struct QaOrchestrator {
    documents: Arc<dyn DocumentStore>,
    history: Arc<dyn ChatHistoryStore>,
    llm: Arc<dyn LanguageModel>,
    prompts: Arc<PromptRenderer>,
}

impl QaOrchestrator {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        history: Arc<dyn ChatHistoryStore>,
        llm: Arc<dyn LanguageModel>,
        prompts: Arc<PromptRenderer>,
    ) -> Self {
        Self {
            documents,
            history,
            llm,
            prompts,
        }
    }

    /// Reject input that cannot be answered. Callers check this before
    /// opening a stream so the error can be reported out of band.
    pub fn validate(question: &str) -> Result<(), ChatError> {
        if question.trim().is_empty() {
            return Err(ChatError::EmptyQuestion);
        }
        Ok(())
    }

    /// Answer `question` within `session_id`.
    ///
    /// Must be called from within a tokio runtime. Nothing is persisted
    /// unless the final [`StreamEvent::Done`] is delivered.
    pub fn handle(&self, question: &str, session_id: &str) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let run = Run {
            documents: Arc::clone(&self.documents),
            history: Arc::clone(&self.history),
            llm: Arc::clone(&self.llm),
            prompts: Arc::clone(&self.prompts),
            question: question.to_string(),
            session_id: session_id.to_string(),
            tx,
        };
        tokio::spawn(run.execute());
        Box::pin(ReceiverStream::new(rx))
    }
}

impl std::fmt::Debug for QaOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QaOrchestrator")
            .field("prompts", &self.prompts)
            .finish_non_exhaustive()
    }
}

/// State owned by one producer task.
struct Run {
    documents: Arc<dyn DocumentStore>,
    history: Arc<dyn ChatHistoryStore>,
    llm: Arc<dyn LanguageModel>,
    prompts: Arc<PromptRenderer>,
    question: String,
    session_id: String,
    tx: mpsc::Sender<Result<StreamEvent, ChatError>>,
}

impl Run {
    async fn execute(self) {
        match self.answer().await {
            Ok(answer) => self.persist(&answer).await,
            Err(Halt::Disconnected) => {
                debug!(session_id = %self.session_id, "Client disconnected; exchange not saved");
            }
            Err(Halt::Failed(err)) => {
                warn!(session_id = %self.session_id, error = %err, "Answer stream failed");
                let _ = self.tx.send(Err(err)).await;
            }
        }
    }

    async fn emit(&self, event: StreamEvent) -> Result<(), Halt> {
        self.tx
            .send(Ok(event))
            .await
            .map_err(|_| Halt::Disconnected)
    }

    /// Run the pipeline up to and including `Done`. Returns the full answer.
    async fn answer(&self) -> Result<String, Halt> {
        debug!(session_id = %self.session_id, "Answering question");
        self.emit(StreamEvent::SessionId(self.session_id.clone()))
            .await?;

        let chat_history = self
            .history
            .load(&self.session_id)
            .await
            .map_err(|e| ChatError::History(e.to_string()))?;

        let query = self.condense(&chat_history).await?;
        debug!(condensed = %query, question = %self.question, "Retrieval query");

        let docs = self
            .documents
            .retrieve(&query)
            .await
            .map_err(|e| ChatError::Retrieval(e.to_string()))?;
        for doc in &docs {
            debug!(source = doc.source_name(), "Retrieved passage");
            self.emit(StreamEvent::Source(doc.clone())).await?;
        }

        let prompt = self
            .prompts
            .render(
                RAG_PROMPT,
                json!({
                    "question": self.question,
                    "docs": docs,
                    "chat_history": chat_history,
                }),
            )
            .map_err(|e| ChatError::Prompt(e.to_string()))?;

        let mut tokens = self
            .llm
            .stream(&prompt)
            .await
            .map_err(|e| ChatError::Generation(e.to_string()))?;

        let mut answer = String::new();
        while let Some(item) = tokens.next().await {
            let token = item.map_err(|e| ChatError::Generation(e.to_string()))?;
            answer.push_str(&token);
            self.emit(StreamEvent::Token(token)).await?;
        }
        debug!(answer_len = answer.len(), "Answer complete");

        self.emit(StreamEvent::Done).await?;
        Ok(answer)
    }

    /// Restate the question so it stands without the conversation. A
    /// first question is used as-is.
    async fn condense(&self, chat_history: &[Message]) -> Result<String, ChatError> {
        if chat_history.is_empty() {
            return Ok(self.question.clone());
        }
        let prompt = self
            .prompts
            .render(
                CONDENSE_QUESTION_PROMPT,
                json!({
                    "question": self.question,
                    "chat_history": chat_history,
                }),
            )
            .map_err(|e| ChatError::Prompt(e.to_string()))?;
        self.llm
            .complete(&prompt)
            .await
            .map_err(|e| ChatError::Condense(e.to_string()))
    }

    async fn persist(&self, answer: &str) {
        if let Err(e) = self
            .history
            .append_user(&self.session_id, &self.question)
            .await
        {
            error!(session_id = %self.session_id, error = %e, "Failed to save question");
            return;
        }
        if let Err(e) = self
            .history
            .append_assistant(&self.session_id, answer)
            .await
        {
            error!(session_id = %self.session_id, error = %e, "Failed to save answer");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
