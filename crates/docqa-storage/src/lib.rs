//! docqa storage crate - SQLite-backed chat history.
//!
//! Provides a WAL-mode SQLite database with migrations and a
//! `ChatHistoryStore` implementation keyed by session id.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::SqliteChatHistory;
