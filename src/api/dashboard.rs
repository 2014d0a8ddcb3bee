//! Dashboard snapshot endpoint.

use axum::extract::{Query, State};

use super::{revision, success, ApiResult};
use crate::dashboard::{DashboardShell, DashboardView};
use crate::models::Viewer;
use crate::AppState;

/// GET /api/dashboard?role=&id=... - One fetch-and-filter pass for a viewer.
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(viewer): Query<Viewer>,
) -> ApiResult<DashboardView> {
    let revision_id = revision(&state).await;
    let shell = DashboardShell::new(
        state.store.clone(),
        viewer,
        state.config.sync.dashboard_poll_interval,
    );
    success(shell.refresh().await, revision_id)
}
