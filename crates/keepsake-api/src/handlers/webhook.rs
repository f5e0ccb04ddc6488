//! Stripe webhook endpoint.
//!
//! Unauthenticated by design; trust comes from the signature header. The
//! raw body must be verified byte-for-byte before any parsing.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::services::BillingEventProcessor;
use crate::state::AppState;

/// Handle a Stripe webhook delivery.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let handler = state.webhook.as_ref().ok_or(ApiError::NotConfigured)?;

    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::InvalidWebhookSignature)?;

    let event = handler.verify_and_parse(&body, signature).map_err(|e| {
        warn!(error = %e, "Webhook signature verification failed");
        ApiError::InvalidWebhookSignature
    })?;

    let event_type = event.event_type.clone();
    let processor = BillingEventProcessor::new(state.firestore.clone());
    let outcome = processor.process(state.billing.as_ref(), event).await?;

    info!(event_type = %event_type, outcome = %outcome, "Webhook processed");

    Ok(Json(serde_json::json!({ "received": true, "outcome": outcome })))
}
