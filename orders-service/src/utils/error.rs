//! Unified Error Handling
//!
//! Provides the application-level error type and the HTTP error body.
//!
//! # Error codes
//!
//! | Code  | Variant       | HTTP | Retry on the write path |
//! |-------|---------------|------|--------------------------|
//! | E0001 | `Decode`      | 400  | never (permanent reject) |
//! | E0002 | `Validation`  | 400  | never (permanent reject) |
//! | E0003 | `NotFound`    | 404  | -                        |
//! | E0004 | `Conflict`    | 409  | never (permanent reject) |
//! | E0005 | `Rejected`    | 422  | never (permanent reject) |
//! | E9002 | `Unavailable` | 503  | requeue                  |
//! | E9003 | `Timeout`     | 503  | requeue                  |
//! | E9004 | `Broker`      | 503  | requeue                  |
//! | E9005 | `Config`      | 500  | -                        |
//! | E9001 | `Internal`    | 500  | -                        |

use std::time::Duration;

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::db::StoreError;

/// Application-level Result type
pub type AppResult<T> = Result<T, AppError>;

/// Error body returned by the HTTP API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Application-level error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ========== Payload Errors ==========
    #[error("Malformed payload: {0}")]
    Decode(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // ========== Store Outcomes ==========
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Order already exists: {0}")]
    Conflict(String),

    #[error("Rejected by store: {0}")]
    Rejected(String),

    // ========== Transient Errors ==========
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Broker error: {0}")]
    Broker(String),

    // ========== System Errors ==========
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn decode(msg: impl Into<String>) -> Self {
        AppError::Decode(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(order_id: impl Into<String>) -> Self {
        AppError::NotFound(order_id.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        AppError::Config(msg.into())
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Unavailable(_) | AppError::Timeout(_) | AppError::Broker(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// Stable error code (see module table)
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Decode(_) => "E0001",
            AppError::Validation(_) => "E0002",
            AppError::NotFound(_) => "E0003",
            AppError::Conflict(_) => "E0004",
            AppError::Rejected(_) => "E0005",
            AppError::Internal(_) => "E9001",
            AppError::Unavailable(_) => "E9002",
            AppError::Timeout(_) => "E9003",
            AppError::Broker(_) => "E9004",
            AppError::Config(_) => "E9005",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            AppError::Decode(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unavailable(_) | AppError::Timeout(_) | AppError::Broker(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(order_id) => AppError::Conflict(order_id),
            StoreError::NotFound(order_id) => AppError::NotFound(order_id),
            StoreError::Rejected(msg) => AppError::Rejected(msg),
            StoreError::Unavailable(msg) => AppError::Unavailable(msg),
        }
    }
}

impl From<lapin::Error> for AppError {
    fn from(e: lapin::Error) -> Self {
        AppError::Broker(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();

        // Infrastructure details stay in the logs
        let message = if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
            match status {
                StatusCode::SERVICE_UNAVAILABLE => "Service temporarily unavailable".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = Json(ErrorBody {
            code: self.code().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Unavailable("pool timed out".into()).is_transient());
        assert!(AppError::Timeout(Duration::from_secs(30)).is_transient());
        assert!(!AppError::Conflict("ORD-1".into()).is_transient());
        assert!(!AppError::decode("eof").is_transient());
        assert!(!AppError::not_found("ORD-1").is_transient());
    }

    #[test]
    fn test_store_error_conversion_keeps_kind() {
        let err: AppError = StoreError::NotFound("ORD-9".into()).into();
        assert!(err.is_not_found());
        assert_eq!(err.http_status(), StatusCode::NOT_FOUND);

        let err: AppError = StoreError::Conflict("ORD-9".into()).into();
        assert_eq!(err.code(), "E0004");
    }

    #[test]
    fn test_server_errors_hide_details() {
        let response = AppError::Unavailable("connection refused 10.0.0.3".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
