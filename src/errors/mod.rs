//! Error handling module for the Royal Academy backend.
//!
//! Provides centralized error types with mapping to HTTP status codes and response envelopes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::live::{LifecycleError, MediaError, MediaKind};
use crate::payments::PaymentError;

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const MEDIA_PERMISSION_DENIED: &str = "MEDIA_PERMISSION_DENIED";
    pub const INVALID_STATE: &str = "INVALID_STATE";
    pub const PAYMENT_DECLINED: &str = "PAYMENT_DECLINED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Authentication required
    Unauthorized(String),
    /// Resource not found
    NotFound(String),
    /// Validation error
    Validation(String),
    /// A camera, microphone or screen capture was refused by the user agent
    MediaDenied { message: String, device: MediaKind },
    /// The record has already moved to paid
    AlreadyPaid { message: String, record_id: String },
    /// Operation is not allowed in the current lifecycle state
    InvalidState(String),
    /// The payment gateway refused the charge
    PaymentDeclined(String),
    /// Database error
    Database(String),
    /// Internal server error
    Internal(String),
    /// Bad request
    BadRequest(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::MediaDenied { .. } => StatusCode::FORBIDDEN,
            AppError::AlreadyPaid { .. } => StatusCode::BAD_REQUEST,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::MediaDenied { .. } => codes::MEDIA_PERMISSION_DENIED,
            AppError::AlreadyPaid { .. } => codes::VALIDATION_ERROR,
            AppError::InvalidState(_) => codes::INVALID_STATE,
            AppError::PaymentDeclined(_) => codes::PAYMENT_DECLINED,
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        match self {
            AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::MediaDenied { message: msg, .. }
            | AppError::AlreadyPaid { message: msg, .. }
            | AppError::InvalidState(msg)
            | AppError::PaymentDeclined(msg)
            | AppError::Database(msg)
            | AppError::Internal(msg)
            | AppError::BadRequest(msg) => msg,
        }
    }
}

impl AppError {
    /// Structured context for the client, where the variant carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::MediaDenied { device, .. } => Some(json!({ "device": device })),
            AppError::AlreadyPaid { record_id, .. } => Some(json!({ "recordId": record_id })),
            _ => None,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Media(media) => {
                let device = match &media {
                    MediaError::PermissionDenied(kind) | MediaError::NoDevice(kind) => *kind,
                };
                AppError::MediaDenied {
                    message: media.to_string(),
                    device,
                }
            }
            LifecycleError::MissingTitle => AppError::Validation(err.to_string()),
            LifecycleError::NotInSetup(_)
            | LifecycleError::NotLive(_)
            | LifecycleError::AlreadyLive
            | LifecycleError::NoTrack(_) => AppError::InvalidState(err.to_string()),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotFound(_) => AppError::NotFound(err.to_string()),
            PaymentError::AlreadyPaid(ref id) => AppError::AlreadyPaid {
                record_id: id.clone(),
                message: err.to_string(),
            },
            PaymentError::InvalidAmount(_) => AppError::Validation(err.to_string()),
            PaymentError::Declined(_) => AppError::PaymentDeclined(err.to_string()),
        }
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
    pub revision_id: i64,
}

impl ErrorResponse {
    pub fn new(error: &AppError, revision_id: i64) -> Self {
        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message().to_string(),
                details: error.details(),
            },
            revision_id,
        }
    }
}

/// Wrapper type for errors that carry revision_id context.
pub struct AppErrorWithRevision {
    pub error: AppError,
    pub revision_id: i64,
}

impl IntoResponse for AppErrorWithRevision {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let body = ErrorResponse::new(&self.error, self.revision_id);
        (status, Json(body)).into_response()
    }
}
