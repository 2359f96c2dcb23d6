//! Elasticsearch-backed collaborators for docqa.
//!
//! - [`ElasticsearchStore`] retrieves passages with ELSER sparse-vector
//!   (`text_expansion`) queries.
//! - [`ElasticsearchChatHistory`] keeps per-session message logs in a
//!   dedicated index.
//!
//! Both share an [`ElasticsearchClient`], a thin JSON-over-HTTP wrapper that
//! handles endpoint resolution (URL or Elastic Cloud id) and authentication.

pub mod client;
pub mod history;
pub mod store;

pub use client::ElasticsearchClient;
pub use history::ElasticsearchChatHistory;
pub use store::ElasticsearchStore;
