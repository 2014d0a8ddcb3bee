//! SQLite persistence for the document store.
//!
//! One row per key plus a single `meta` row carrying the global revision.

mod repository;

pub use repository::*;

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

/// Applied in order on every start; each statement is idempotent.
const MIGRATIONS: [&str; 4] = [
    r#"CREATE TABLE IF NOT EXISTS meta (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        schema_version INTEGER NOT NULL DEFAULT 1,
        revision_id INTEGER NOT NULL DEFAULT 0,
        generated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )"#,
    r#"INSERT OR IGNORE INTO meta (id, schema_version, revision_id, generated_at)
       VALUES (1, 1, 0, datetime('now'))"#,
    r#"CREATE TABLE IF NOT EXISTS documents (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        revision_id INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at)",
];

/// Open (creating if needed) the database at `db_path` and bring the schema up to date.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::warn!("Could not create database directory {:?}: {}", parent, e);
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    for statement in MIGRATIONS {
        sqlx::query(statement).execute(&pool).await?;
    }

    Ok(pool)
}
