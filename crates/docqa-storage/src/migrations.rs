//! Database schema migrations.

use rusqlite::Connection;
use tracing::info;

use docqa_core::error::DocqaError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), DocqaError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| DocqaError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| DocqaError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: chat_messages");
    }

    Ok(())
}

/// Version 1: chat message log.
fn apply_v1(conn: &Connection) -> Result<(), DocqaError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS chat_messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL,
            role        TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            content     TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_session
            ON chat_messages (session_id, id);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'chat_messages');
        ",
    )
    .map_err(|e| DocqaError::Storage(format!("Migration v1 failed: {}", e)))
}
