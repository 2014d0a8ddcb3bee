//! Payment endpoints backed by the configured gateway.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{error, revision, success, ApiResult};
use crate::models::{FeeRecord, Viewer};
use crate::payments::Settlement;
use crate::AppState;

fn default_method() -> String {
    "card".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayRequest {
    #[serde(default = "default_method")]
    pub method: String,
}

/// POST /api/fees/{id}/pay
pub async fn pay_fee(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(payer): Query<Viewer>,
    Json(request): Json<PayRequest>,
) -> ApiResult<FeeRecord> {
    let result = state
        .payments
        .process_payment(&id, &payer, &request.method)
        .await;
    let revision_id = revision(&state).await;
    match result {
        Ok(fee) => success(fee, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/payment-requests/{id}/pay
pub async fn pay_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(payer): Query<Viewer>,
    Json(request): Json<PayRequest>,
) -> ApiResult<Settlement> {
    let result = state
        .payments
        .settle_request(&id, &payer, &request.method)
        .await;
    let revision_id = revision(&state).await;
    match result {
        Ok(settlement) => success(settlement, revision_id),
        Err(e) => error(e, revision_id),
    }
}
