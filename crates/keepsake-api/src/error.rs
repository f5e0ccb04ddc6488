//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use keepsake_models::QuotaDimension;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{}", .0.limit_message())]
    QuotaExceeded(QuotaDimension),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    #[error("Billing is not configured")]
    NotConfigured,

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Firestore error: {0}")]
    Firestore(#[from] keepsake_firestore::FirestoreError),

    #[error("Billing error: {0}")]
    Billing(#[from] keepsake_billing::BillingError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::QuotaExceeded(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_)
            | ApiError::Validation(_)
            | ApiError::InvalidWebhookSignature => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            // Caller mistakes from the billing layer are 400s, not 500s.
            ApiError::Billing(e) if e.is_caller_error() => StatusCode::BAD_REQUEST,
            ApiError::NotConfigured
            | ApiError::Internal(_)
            | ApiError::Firestore(_)
            | ApiError::Billing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let error = match &self {
            ApiError::Billing(e) if e.is_caller_error() => e.to_string(),
            ApiError::Internal(_) | ApiError::Firestore(_) | ApiError::Billing(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            ApiError::NotConfigured => "Billing is not configured".to_string(),
            _ => self.to_string(),
        };

        let body = ErrorResponse { error };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_errors_are_forbidden() {
        assert_eq!(
            ApiError::QuotaExceeded(QuotaDimension::Stories).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::QuotaExceeded(QuotaDimension::Storage).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_quota_error_messages() {
        assert_eq!(
            ApiError::QuotaExceeded(QuotaDimension::Stories).to_string(),
            "Story limit reached for your plan"
        );
        assert_eq!(
            ApiError::QuotaExceeded(QuotaDimension::Videos).to_string(),
            "Video limit reached for your plan"
        );
        assert_eq!(
            ApiError::QuotaExceeded(QuotaDimension::Storage).to_string(),
            "Storage limit reached"
        );
    }

    #[test]
    fn test_webhook_signature_is_bad_request() {
        assert_eq!(
            ApiError::InvalidWebhookSignature.status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
