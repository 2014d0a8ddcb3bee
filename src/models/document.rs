//! Raw document store types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON document stored under a string key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub key: String,
    pub value: Value,
    pub revision_id: i64,
    pub updated_at: String,
}

/// Listing entry for a stored document, without its value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub key: String,
    pub revision_id: i64,
    pub updated_at: String,
}

/// Changefeed event emitted after every effective write or delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChange {
    pub key: String,
    pub revision_id: i64,
    /// New value, or `None` when the document was removed
    pub value: Option<Value>,
}

/// Result of a write against the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub revision_id: i64,
    /// False when the stored value was already identical
    pub changed: bool,
}

/// Revision information for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}
