//! Presence endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use super::{revision, success, ApiResult};
use crate::models::PresenceIdentity;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceInfo {
    pub session_id: String,
    pub active_viewers: usize,
}

/// POST /api/presence/{sessionId}/heartbeat - One presence upsert.
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(identity): Json<PresenceIdentity>,
) -> ApiResult<PresenceInfo> {
    if !state.presence.beat(&session_id, &identity).await {
        tracing::warn!(session_id = %session_id, "Heartbeat was not persisted remotely");
    }
    let active_viewers = state.presence.count_active(&session_id).await;
    let revision_id = revision(&state).await;
    success(
        PresenceInfo {
            session_id,
            active_viewers,
        },
        revision_id,
    )
}

/// GET /api/presence/{sessionId}
pub async fn get_presence(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<PresenceInfo> {
    let revision_id = revision(&state).await;
    let active_viewers = state.presence.count_active(&session_id).await;
    success(
        PresenceInfo {
            session_id,
            active_viewers,
        },
        revision_id,
    )
}
