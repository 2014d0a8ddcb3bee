//! Read receipts for notifications and audio messages.

use axum::extract::{Path, Query, State};

use super::{error, revision, success, ApiResult};
use crate::models::{keys, AudioMessage, Notification, Viewer};
use crate::records::mark_read;
use crate::AppState;

/// POST /api/notifications/{id}/read
pub async fn read_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(viewer): Query<Viewer>,
) -> ApiResult<Notification> {
    let result = mark_read(&state.store, keys::NOTIFICATIONS, &id, &viewer).await;
    let revision_id = revision(&state).await;
    match result {
        Ok(notification) => success(notification, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/audio-messages/{id}/read
pub async fn read_audio_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(viewer): Query<Viewer>,
) -> ApiResult<AudioMessage> {
    let result = mark_read(&state.store, keys::AUDIO_MESSAGES, &id, &viewer).await;
    let revision_id = revision(&state).await;
    match result {
        Ok(message) => success(message, revision_id),
        Err(e) => error(e, revision_id),
    }
}
