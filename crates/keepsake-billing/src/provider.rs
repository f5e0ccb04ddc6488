//! Payment provider abstraction.

use async_trait::async_trait;

use keepsake_models::PlanTier;

use crate::stripe::StripeSubscription;
use crate::{BillingError, CheckoutParams, CheckoutSession};

/// Payment provider trait.
///
/// Abstracts the payment backend so handlers and tests are not tied to
/// Stripe's HTTP API.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Ensure a customer exists for the user, returning its id.
    async fn ensure_customer(
        &self,
        user_id: &str,
        email: &str,
        existing_customer_id: Option<&str>,
    ) -> Result<String, BillingError>;

    /// Create a subscription checkout session.
    async fn create_checkout_session(
        &self,
        customer_id: &str,
        plan: PlanTier,
        params: CheckoutParams<'_>,
    ) -> Result<CheckoutSession, BillingError>;

    /// Create a customer portal session, returning its URL.
    async fn create_portal_session(&self, customer_id: &str) -> Result<String, BillingError>;

    /// Fetch a subscription by id.
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, BillingError>;
}
