//! Error types for the question-answer pipeline.

/// Errors from answering a question. Each variant names the step that
/// failed and carries the underlying message.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("question cannot be empty")]
    EmptyQuestion,
    #[error("chat history error: {0}")]
    History(String),
    #[error("question condensation failed: {0}")]
    Condense(String),
    #[error("retrieval failed: {0}")]
    Retrieval(String),
    #[error("prompt error: {0}")]
    Prompt(String),
    #[error("generation failed: {0}")]
    Generation(String),
}
