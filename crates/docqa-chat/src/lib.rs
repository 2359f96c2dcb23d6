//! Question answering over retrieved documents.
//!
//! [`QaOrchestrator`] turns a question and a session id into a stream of
//! [`StreamEvent`](docqa_core::StreamEvent)s: the session id, the passages
//! the answer is grounded on, the answer tokens, and a terminal marker. The
//! exchange is written to chat history once the stream completes.

pub mod error;
pub mod orchestrator;

pub use error::ChatError;
pub use orchestrator::{EventStream, QaOrchestrator};
