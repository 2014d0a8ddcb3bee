//! Document repository backed by SQLite.
//!
//! Every effective write runs in a transaction that also bumps the global
//! revision, then publishes a [`DocumentChange`] on the changefeed. Writes
//! are last-writer-wins; there is no compare-and-swap.

use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;

use crate::errors::AppError;
use crate::models::{Document, DocumentChange, DocumentSummary, RevisionInfo, WriteOutcome};

const CHANGEFEED_CAPACITY: usize = 256;

/// Database repository for all document operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    changes: broadcast::Sender<DocumentChange>,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGEFEED_CAPACITY);
        Self { pool, changes }
    }

    /// Subscribe to the changefeed. Only changes made after this call are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    /// List all stored keys.
    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>, AppError> {
        let rows = sqlx::query("SELECT key, revision_id, updated_at FROM documents ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| DocumentSummary {
                key: row.get("key"),
                revision_id: row.get("revision_id"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    /// Get a document by key.
    pub async fn get_document(&self, key: &str) -> Result<Option<Document>, AppError> {
        let row =
            sqlx::query("SELECT key, value, revision_id, updated_at FROM documents WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|row| document_from_row(&row)).transpose()
    }

    /// Store `value` under `key`.
    ///
    /// Writing a value equal to the stored one changes nothing and emits no event.
    pub async fn put_document(&self, key: &str, value: &Value) -> Result<WriteOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT value FROM documents WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(row) = existing {
            let stored: String = row.get("value");
            if serde_json::from_str::<Value>(&stored).ok().as_ref() == Some(value) {
                let revision_id = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
                    .fetch_one(&mut *tx)
                    .await?
                    .get("revision_id");
                return Ok(WriteOutcome {
                    revision_id,
                    changed: false,
                });
            }
        }

        let now = Utc::now().to_rfc3339();
        let revision_id = bump_revision(&mut tx, &now).await?;

        sqlx::query(
            r#"INSERT INTO documents (key, value, revision_id, updated_at) VALUES (?, ?, ?, ?)
               ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   revision_id = excluded.revision_id,
                   updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(value.to_string())
        .bind(revision_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.publish(DocumentChange {
            key: key.to_string(),
            revision_id,
            value: Some(value.clone()),
        });

        Ok(WriteOutcome {
            revision_id,
            changed: true,
        })
    }

    /// Remove a document. Returns false when the key did not exist.
    pub async fn delete_document(&self, key: &str) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM documents WHERE key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        let now = Utc::now().to_rfc3339();
        let revision_id = bump_revision(&mut tx, &now).await?;
        tx.commit().await?;

        self.publish(DocumentChange {
            key: key.to_string(),
            revision_id,
            value: None,
        });

        Ok(true)
    }

    fn publish(&self, change: DocumentChange) {
        // No receivers is the normal idle state.
        if self.changes.send(change).is_err() {
            tracing::trace!("Changefeed has no subscribers");
        }
    }
}

async fn bump_revision(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    now: &str,
) -> Result<i64, AppError> {
    let row = sqlx::query(
        "UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1 RETURNING revision_id",
    )
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.get("revision_id"))
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Document, AppError> {
    let raw: String = row.get("value");
    let value = serde_json::from_str(&raw).map_err(|e| {
        AppError::Internal(format!(
            "Stored document {} is not valid JSON: {}",
            row.get::<String, _>("key"),
            e
        ))
    })?;

    Ok(Document {
        key: row.get("key"),
        value,
        revision_id: row.get("revision_id"),
        updated_at: row.get("updated_at"),
    })
}
