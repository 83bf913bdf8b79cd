//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side errors to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`; errors render as `{"success": false, "error": "..."}`.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{ContactError, DownloadError, OrderError, ResetError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Order operation failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Download fulfillment failed.
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    /// Password reset failed.
    #[error("Password reset error: {0}")]
    Reset(#[from] ResetError),

    /// Contact form rejected.
    #[error("Contact error: {0}")]
    Contact(#[from] ContactError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

}

impl AppError {
    /// HTTP status and client-safe message.
    fn status_and_message(&self) -> (StatusCode, String) {
        const INTERNAL: &str = "Internal server error";

        match self {
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_string()),
            Self::Order(err) => match err {
                OrderError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                OrderError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
                OrderError::InvalidTransition { .. } | OrderError::ConcurrentUpdate => {
                    (StatusCode::CONFLICT, err.to_string())
                }
                OrderError::Payment(_) => (
                    StatusCode::BAD_GATEWAY,
                    "Payment could not be processed".to_string(),
                ),
                OrderError::Repository(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_string())
                }
            },
            Self::Download(err) => match err {
                DownloadError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                DownloadError::ProductNotFound | DownloadError::FileNotFound => {
                    (StatusCode::NOT_FOUND, err.to_string())
                }
                DownloadError::PaymentRequired => (StatusCode::PAYMENT_REQUIRED, err.to_string()),
                DownloadError::NotEntitled => (StatusCode::FORBIDDEN, err.to_string()),
                DownloadError::Storage(_) => {
                    (StatusCode::BAD_GATEWAY, "File not available".to_string())
                }
                DownloadError::Repository(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_string())
                }
            },
            Self::Reset(err) => match err {
                ResetError::InvalidEmail(_) => {
                    (StatusCode::BAD_REQUEST, "Invalid email address".to_string())
                }
                ResetError::WeakPassword(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                ResetError::InvalidToken => (StatusCode::BAD_REQUEST, err.to_string()),
                ResetError::Delivery(_) => (
                    StatusCode::BAD_GATEWAY,
                    "Could not send reset email, please try again later".to_string(),
                ),
                ResetError::PasswordHash | ResetError::Repository(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_string())
                }
            },
            Self::Contact(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order".to_string());
        assert_eq!(err.to_string(), "Not found: order");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_order_error_status_codes() {
        assert_eq!(
            get_status(OrderError::Validation("bad".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(OrderError::NotFound.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(
                OrderError::InvalidTransition {
                    field: "status",
                    from: "COMPLETED",
                    to: "PENDING",
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(OrderError::Repository(RepositoryError::NotFound).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_download_error_status_codes() {
        assert_eq!(
            get_status(DownloadError::PaymentRequired.into()),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            get_status(DownloadError::NotEntitled.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(DownloadError::FileNotFound.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(
                DownloadError::Storage(crate::storage::StorageError::Api {
                    status: 500,
                    message: "down".to_string(),
                })
                .into()
            ),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::Database(RepositoryError::DataCorruption(
            "orders.total is NULL".to_string(),
        ));
        let (_, message) = err.status_and_message();
        assert_eq!(message, "Internal server error");
    }

    #[test]
    fn test_not_found_status() {
        assert_eq!(
            get_status(AppError::NotFound("product".to_string())),
            StatusCode::NOT_FOUND
        );
    }
}
