//! Raw document endpoints and the per-key changefeed.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use super::{error, revision, success, ApiResult};
use crate::errors::AppError;
use crate::models::{Document, DocumentSummary, RevisionInfo, WriteOutcome};
use crate::AppState;

/// GET /api/revision - Current revision info for polling clients.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    match state.repo.get_revision_info().await {
        Ok(info) => {
            let revision_id = info.revision_id;
            success(info, revision_id)
        }
        Err(e) => error(e, 0),
    }
}

/// GET /api/documents - List stored keys.
pub async fn list_documents(State(state): State<AppState>) -> ApiResult<Vec<DocumentSummary>> {
    let revision_id = revision(&state).await;

    match state.repo.list_documents().await {
        Ok(documents) => success(documents, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/documents/{key}
pub async fn get_document(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Document> {
    let revision_id = revision(&state).await;

    match state.repo.get_document(&key).await {
        Ok(Some(document)) => success(document, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Document {} not found", key)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/documents/{key} - Replace the whole document.
pub async fn put_document(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> ApiResult<WriteOutcome> {
    if key.trim().is_empty() {
        return error(AppError::Validation("Key is required".to_string()), 0);
    }

    match state.repo.put_document(&key, &value).await {
        Ok(outcome) => success(outcome, outcome.revision_id),
        Err(e) => {
            let revision_id = revision(&state).await;
            error(e, revision_id)
        }
    }
}

/// DELETE /api/documents/{key}
pub async fn delete_document(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<()> {
    match state.repo.delete_document(&key).await {
        Ok(true) => {
            let revision_id = revision(&state).await;
            success((), revision_id)
        }
        Ok(false) => {
            let revision_id = revision(&state).await;
            error(
                AppError::NotFound(format!("Document {} not found", key)),
                revision_id,
            )
        }
        Err(e) => error(e, 0),
    }
}

/// GET /api/documents/{key}/events - Server-sent changefeed for one key.
///
/// Each event is a `change` carrying `{ key, revisionId, value }`; a removed
/// document has a null value. A subscriber that falls behind gets a `resync`
/// event and should refetch.
pub async fn document_events(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let feed = state.repo.subscribe();
    tracing::debug!(key = %key, "Changefeed subscriber connected");

    let events = stream::unfold((feed, key), |(mut feed, key)| async move {
        loop {
            let event = match feed.recv().await {
                Ok(change) if change.key == key => match Event::default()
                    .event("change")
                    .json_data(&change)
                {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(key = %key, "Failed to encode change event: {}", e);
                        continue;
                    }
                },
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => Event::default()
                    .event("resync")
                    .data(skipped.to_string()),
                Err(RecvError::Closed) => return None,
            };
            return Some((Ok(event), (feed, key)));
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
