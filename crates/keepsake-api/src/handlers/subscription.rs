//! Subscription and quota handlers.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use keepsake_models::{QuotaDimension, UsageSnapshot};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::services::entitlement::StorageDecision;
use crate::state::AppState;

/// Get the caller's subscription and current usage.
pub async fn get_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<UsageSnapshot>> {
    let usage = state.entitlements.current_usage(&user.uid).await?;
    Ok(Json(usage))
}

/// Storage allowance request.
#[derive(Deserialize)]
pub struct StorageRequest {
    /// Upload size in bytes.
    pub bytes: u64,
    /// When true, report whether the upload would fit without reserving.
    #[serde(default, rename = "checkOnly")]
    pub check_only: bool,
}

#[derive(Debug, Serialize)]
pub struct StorageResponse {
    pub ok: bool,
    pub requested_mb: u64,
    pub storage_used_mb: u64,
    pub max_storage_mb: u64,
}

/// Check or reserve storage for an upload.
///
/// Both modes report a denial as a quota rejection; check-only requests
/// just skip the reservation write.
pub async fn request_storage(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<StorageRequest>,
) -> ApiResult<Json<StorageResponse>> {
    if req.bytes == 0 {
        return Err(ApiError::bad_request("bytes must be greater than zero"));
    }

    let decision = if req.check_only {
        state.entitlements.check_storage(&user.uid, req.bytes).await?
    } else {
        state.entitlements.reserve_storage(&user.uid, req.bytes).await?
    };

    storage_response(decision).map(Json)
}

/// Map a storage decision to the response body, rejecting denials with a
/// storage quota error regardless of check-only mode.
fn storage_response(decision: StorageDecision) -> ApiResult<StorageResponse> {
    if !decision.allowed {
        return Err(ApiError::QuotaExceeded(QuotaDimension::Storage));
    }

    Ok(StorageResponse {
        ok: true,
        requested_mb: decision.requested_mb,
        storage_used_mb: decision.used_mb,
        max_storage_mb: decision.limit_mb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn denied() -> StorageDecision {
        StorageDecision {
            allowed: false,
            used_mb: 480,
            limit_mb: 500,
            requested_mb: 64,
        }
    }

    #[test]
    fn test_denied_storage_is_a_quota_error() {
        // Both check-only and reserving requests go through this mapping,
        // so a denial surfaces as 403 in either mode.
        let err = storage_response(denied()).unwrap_err();
        assert!(matches!(
            err,
            ApiError::QuotaExceeded(QuotaDimension::Storage)
        ));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_granted_storage_reports_usage() {
        let body = storage_response(StorageDecision {
            allowed: true,
            used_mb: 32,
            limit_mb: 500,
            requested_mb: 16,
        })
        .unwrap();
        assert!(body.ok);
        assert_eq!(body.storage_used_mb, 32);
        assert_eq!(body.max_storage_mb, 500);
    }

    #[test]
    fn test_check_only_deserializes_from_camel_case() {
        let req: StorageRequest =
            serde_json::from_str(r#"{"bytes": 1048576, "checkOnly": true}"#).unwrap();
        assert!(req.check_only);
        assert_eq!(req.bytes, 1_048_576);
    }
}
