//! Pre-shared key authentication for the `/api` routes.
//!
//! The key is accepted from `x-api-key` or as a bearer token and compared in
//! constant time. With no key configured every request is let through.

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::{AppError, AppErrorWithRevision};

pub const API_KEY_HEADER: &str = "x-api-key";

pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    let verdict = presented_key(request.headers()).map(|key| keys_match(key, &expected));

    match verdict {
        Some(true) => next.run(request).await,
        Some(false) => {
            tracing::debug!(path = %request.uri().path(), "Rejected request with wrong API key");
            unauthorized("Invalid API key")
        }
        None => unauthorized("Missing API key"),
    }
}

/// The key a client presented, preferring the dedicated header.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get(API_KEY_HEADER) {
        return key.to_str().ok();
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn keys_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn unauthorized(message: &str) -> Response {
    AppErrorWithRevision {
        error: AppError::Unauthorized(message.to_string()),
        revision_id: 0,
    }
    .into_response()
}
