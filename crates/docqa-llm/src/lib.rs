//! Language model access for docqa.
//!
//! - [`OpenAiChatModel`]: OpenAI-compatible `/chat/completions` client with
//!   single-shot and streaming modes.
//! - [`PromptRenderer`]: minijinja-based prompt templating with the built-in
//!   condensation and answer templates.

pub mod openai;
pub mod prompt;
pub mod sse;

pub use openai::OpenAiChatModel;
pub use prompt::{PromptRenderer, CONDENSE_QUESTION_PROMPT, RAG_PROMPT};
pub use sse::SseDecoder;
