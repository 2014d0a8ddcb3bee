//! REST API module.
//!
//! Every handler answers with the same envelope: `{ success, data, revisionId }`
//! on success and `{ success, error, revisionId }` on failure.

mod dashboard;
mod documents;
mod inbox;
mod live;
mod payments;
mod presence;

pub use dashboard::*;
pub use documents::*;
pub use inbox::*;
pub use live::*;
pub use payments::*;
pub use presence::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::{AppError, AppErrorWithRevision};
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppErrorWithRevision>;

pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

pub fn error<T: Serialize>(err: impl Into<AppError>, revision_id: i64) -> ApiResult<T> {
    Err(AppErrorWithRevision {
        error: err.into(),
        revision_id,
    })
}

/// Current store revision, or 0 when it cannot be read.
async fn revision(state: &AppState) -> i64 {
    state.repo.get_revision_id().await.unwrap_or(0)
}
