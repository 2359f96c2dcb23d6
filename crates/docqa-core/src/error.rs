use thiserror::Error;

/// Top-level error type for docqa.
///
/// Collaborator crates (Elasticsearch, LLM, SQLite) map their transport and
/// driver errors into the matching variant so that `?` works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DocqaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Chat history error: {0}")]
    History(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for DocqaError {
    fn from(err: toml::de::Error) -> Self {
        DocqaError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DocqaError {
    fn from(err: toml::ser::Error) -> Self {
        DocqaError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for DocqaError {
    fn from(err: serde_json::Error) -> Self {
        DocqaError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for docqa operations.
pub type Result<T> = std::result::Result<T, DocqaError>;
