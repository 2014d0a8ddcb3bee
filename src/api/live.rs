//! Live class endpoints.
//!
//! The browser does the device work and reports which devices were granted;
//! these handlers drive the teacher's console state machine accordingly.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{error, revision, success, ApiResult};
use crate::errors::AppError;
use crate::live::{ConsoleStatus, DeviceGrants, LifecycleError, SessionDraft, TeacherIdentity};
use crate::models::{keys, LiveSession, StreamType, Viewer};
use crate::records::load_visible;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupRequest {
    pub teacher_name: String,
    #[serde(default)]
    pub draft: Option<SessionDraft>,
    /// Close the panel without going live
    #[serde(default)]
    pub cancel: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub stream_type: StreamType,
    #[serde(default)]
    pub grants: DeviceGrants,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum MediaAction {
    ToggleCamera,
    ToggleMicrophone,
    SwitchStream {
        stream_type: StreamType,
        #[serde(default)]
        grants: DeviceGrants,
    },
}

/// POST /api/live/{teacherId}/setup - Open, edit, or cancel the setup panel.
pub async fn setup_live(
    State(state): State<AppState>,
    Path(teacher_id): Path<String>,
    Json(request): Json<SetupRequest>,
) -> ApiResult<ConsoleStatus> {
    let revision_id = revision(&state).await;
    let teacher = TeacherIdentity {
        id: teacher_id,
        name: request.teacher_name,
    };
    let console = state.consoles.console(&teacher).await;
    let mut console = console.lock().await;

    let result = if request.cancel {
        console.cancel_setup()
    } else {
        console.open_setup().and_then(|()| match request.draft {
            Some(draft) => console.update_draft(draft),
            None => Ok(()),
        })
    };

    match result {
        Ok(()) => success(console.status(), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/live/{teacherId}/start - Go live with the granted devices.
pub async fn start_live(
    State(state): State<AppState>,
    Path(teacher_id): Path<String>,
    Json(request): Json<StartRequest>,
) -> ApiResult<ConsoleStatus> {
    let Some(console) = state.consoles.find(&teacher_id).await else {
        let revision_id = revision(&state).await;
        return error(LifecycleError::NotInSetup("go live"), revision_id);
    };
    let mut console = console.lock().await;

    let result = console
        .start_streaming(&request.grants, request.stream_type)
        .await;
    let revision_id = revision(&state).await;
    match result {
        Ok(_) => success(console.status(), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/live/{teacherId}/media - Toggle tracks or switch source.
pub async fn control_media(
    State(state): State<AppState>,
    Path(teacher_id): Path<String>,
    Json(action): Json<MediaAction>,
) -> ApiResult<ConsoleStatus> {
    let Some(console) = state.consoles.find(&teacher_id).await else {
        let revision_id = revision(&state).await;
        return error(LifecycleError::NotLive("control media"), revision_id);
    };
    let mut console = console.lock().await;

    let result = match action {
        MediaAction::ToggleCamera => console.toggle_camera().map(|_| ()),
        MediaAction::ToggleMicrophone => console.toggle_microphone().map(|_| ()),
        MediaAction::SwitchStream {
            stream_type,
            grants,
        } => console.switch_stream(&grants, stream_type).await,
    };
    let revision_id = revision(&state).await;
    match result {
        Ok(()) => success(console.status(), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/live/{teacherId}/stop - End the live session.
pub async fn stop_live(
    State(state): State<AppState>,
    Path(teacher_id): Path<String>,
) -> ApiResult<ConsoleStatus> {
    let Some(console) = state.consoles.find(&teacher_id).await else {
        let revision_id = revision(&state).await;
        return error(LifecycleError::NotLive("stop"), revision_id);
    };
    let mut console = console.lock().await;

    let result = console.stop_streaming().await;
    let revision_id = revision(&state).await;
    match result {
        Ok(_) => success(console.status(), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/live/{teacherId}
pub async fn get_console(
    State(state): State<AppState>,
    Path(teacher_id): Path<String>,
) -> ApiResult<ConsoleStatus> {
    let revision_id = revision(&state).await;

    match state.consoles.find(&teacher_id).await {
        Some(console) => success(console.lock().await.status(), revision_id),
        None => error(
            AppError::NotFound(format!("No console for teacher {}", teacher_id)),
            revision_id,
        ),
    }
}

/// GET /api/live/sessions - Published sessions visible to the viewer.
pub async fn list_live_sessions(
    State(state): State<AppState>,
    Query(viewer): Query<Viewer>,
) -> ApiResult<Vec<LiveSession>> {
    let revision_id = revision(&state).await;
    let sessions = load_visible(&state.store, keys::LIVE_SESSIONS, &viewer).await;
    success(sessions, revision_id)
}
