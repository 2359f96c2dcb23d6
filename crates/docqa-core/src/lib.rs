//! Shared foundation for docqa: configuration, error type, the chat data
//! model, and the collaborator traits the orchestrator is written against.

pub mod config;
pub mod error;
pub mod mock;
pub mod service;
pub mod types;

pub use config::DocqaConfig;
pub use error::{DocqaError, Result};
pub use service::{ChatHistoryStore, DocumentStore, LanguageModel, TokenStream};
pub use types::*;
