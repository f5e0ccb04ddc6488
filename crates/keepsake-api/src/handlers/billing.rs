//! Checkout and customer portal handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use keepsake_billing::{CheckoutParams, PaymentProvider, StripeProvider};
use keepsake_firestore::CouponRepository;
use keepsake_models::PlanTier;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Checkout session request.
#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub plan: String,
    /// Optional coupon code, resolved against the coupon collection first
    /// and against Stripe coupon ids second.
    #[serde(default, rename = "couponCode")]
    pub coupon_code: Option<String>,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}

/// Create a Stripe checkout session for a plan upgrade.
pub async fn create_checkout_session(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let billing = require_billing(&state)?;

    let plan = match req.plan.to_lowercase().as_str() {
        "pro" => PlanTier::Pro,
        "premium" => PlanTier::Premium,
        other => {
            return Err(ApiError::bad_request(format!("Unknown plan: {}", other)));
        }
    };

    let stripe_coupon_id = match req.coupon_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => Some(resolve_voucher(&state, billing, code).await?),
        _ => None,
    };

    let customer_id = ensure_customer(&state, billing, &user).await?;

    let session = billing
        .create_checkout_session(
            &customer_id,
            plan,
            CheckoutParams {
                user_id: &user.uid,
                stripe_coupon_id: stripe_coupon_id.as_deref(),
            },
        )
        .await?;

    info!(user_id = %user.uid, plan = %plan, "Created checkout session");

    Ok(Json(CheckoutResponse {
        session_id: session.session_id,
        url: session.url,
    }))
}

#[derive(Serialize)]
pub struct PortalResponse {
    pub url: String,
}

/// Create a customer portal session for managing an existing subscription.
pub async fn create_portal_session(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<PortalResponse>> {
    let billing = require_billing(&state)?;

    let record = state.entitlements.subscriptions().ensure(&user.uid).await?;
    let customer_id = record
        .stripe_customer_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("No Stripe customer found"))?;

    let url = billing.create_portal_session(&customer_id).await?;

    Ok(Json(PortalResponse { url }))
}

fn require_billing(state: &AppState) -> ApiResult<&Arc<StripeProvider>> {
    state.billing.as_ref().ok_or(ApiError::NotConfigured)
}

/// Ensure the user has a Stripe customer, persisting a newly created id.
async fn ensure_customer(
    state: &AppState,
    billing: &Arc<StripeProvider>,
    user: &AuthUser,
) -> ApiResult<String> {
    let subscriptions = state.entitlements.subscriptions();
    let record = subscriptions.ensure(&user.uid).await?;
    let existing = record.stripe_customer_id.as_deref().filter(|id| !id.is_empty());

    let email = user.email.as_deref().unwrap_or_default();
    let customer_id = billing.ensure_customer(&user.uid, email, existing).await?;

    if existing != Some(customer_id.as_str()) {
        subscriptions.set_customer_id(&user.uid, &customer_id).await?;
    }

    Ok(customer_id)
}

/// Resolve a voucher code to a Stripe coupon id.
async fn resolve_voucher(
    state: &AppState,
    billing: &Arc<StripeProvider>,
    code: &str,
) -> ApiResult<String> {
    let coupons = CouponRepository::new((*state.firestore).clone());

    if let Some(coupon) = coupons.get_active(code).await? {
        if let Some(stripe_coupon_id) = coupon.stripe_coupon_id {
            // Confirm the mapped coupon is still redeemable on Stripe's side.
            billing.get_coupon(&stripe_coupon_id).await?;
            return Ok(stripe_coupon_id);
        }
    }

    // Fall back to treating the code as a raw Stripe coupon id.
    let coupon = billing.get_coupon(code).await.map_err(|_| {
        ApiError::Billing(keepsake_billing::BillingError::InvalidVoucher)
    })?;
    Ok(coupon.id)
}
