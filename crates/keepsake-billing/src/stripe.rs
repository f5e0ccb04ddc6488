//! Stripe payment provider implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use keepsake_models::PlanTier;

use crate::config::BillingConfig;
use crate::error::BillingError;
use crate::provider::PaymentProvider;
use crate::{CheckoutParams, CheckoutSession};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Stripe payment provider.
#[derive(Clone)]
pub struct StripeProvider {
    client: Client,
    config: BillingConfig,
}

impl StripeProvider {
    pub fn new(config: BillingConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    /// Make an authenticated, form-encoded request to Stripe.
    async fn stripe_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        form: Option<&[(String, String)]>,
    ) -> Result<T, BillingError> {
        let url = format!("{STRIPE_API_BASE}{endpoint}");

        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.config.stripe_secret_key, Option::<&str>::None);

        if let Some(form_data) = form {
            request = request.form(form_data);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Stripe API request failed");
            BillingError::ProviderError(e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Stripe API error");
            return Err(BillingError::ProviderError(format!(
                "Stripe API error: {status}"
            )));
        }

        response.json::<T>().await.map_err(|e| {
            error!(error = %e, "Failed to parse Stripe response");
            BillingError::Internal(e.to_string())
        })
    }

    /// Create a Stripe customer tagged with the owning user id.
    #[instrument(skip(self))]
    async fn create_customer(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<StripeCustomer, BillingError> {
        debug!(user_id = %user_id, "Creating Stripe customer");

        let form = [
            ("email".to_string(), email.to_string()),
            ("metadata[user_id]".to_string(), user_id.to_string()),
        ];

        self.stripe_request(reqwest::Method::POST, "/customers", Some(&form))
            .await
    }

    /// Look up a Stripe coupon, mapping missing or invalid codes to
    /// [`BillingError::InvalidVoucher`].
    #[instrument(skip(self))]
    pub async fn get_coupon(&self, coupon_id: &str) -> Result<StripeCoupon, BillingError> {
        let coupon: StripeCoupon = self
            .stripe_request(
                reqwest::Method::GET,
                &format!("/coupons/{coupon_id}"),
                None,
            )
            .await
            .map_err(|_| BillingError::InvalidVoucher)?;

        if !coupon.valid {
            return Err(BillingError::InvalidVoucher);
        }
        Ok(coupon)
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    #[instrument(skip(self))]
    async fn ensure_customer(
        &self,
        user_id: &str,
        email: &str,
        existing_customer_id: Option<&str>,
    ) -> Result<String, BillingError> {
        if let Some(id) = existing_customer_id {
            return Ok(id.to_string());
        }
        let customer = self.create_customer(user_id, email).await?;
        Ok(customer.id)
    }

    #[instrument(skip(self, params))]
    async fn create_checkout_session(
        &self,
        customer_id: &str,
        plan: PlanTier,
        params: CheckoutParams<'_>,
    ) -> Result<CheckoutSession, BillingError> {
        debug!(customer_id = %customer_id, plan = %plan, "Creating checkout session");

        let price_id = self.config.price_id(plan).ok_or(BillingError::UnknownPlan)?;

        let mut form: Vec<(String, String)> = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("mode".to_string(), "subscription".to_string()),
            ("success_url".to_string(), self.config.success_url()),
            ("cancel_url".to_string(), self.config.cancel_url()),
            ("line_items[0][price]".to_string(), price_id.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            // Propagated onto the subscription so webhook events can
            // resolve the user without a reverse customer lookup.
            (
                "subscription_data[metadata][user_id]".to_string(),
                params.user_id.to_string(),
            ),
            (
                "subscription_data[metadata][plan]".to_string(),
                plan.as_str().to_string(),
            ),
            ("metadata[user_id]".to_string(), params.user_id.to_string()),
            ("metadata[plan]".to_string(), plan.as_str().to_string()),
        ];

        if let Some(coupon_id) = params.stripe_coupon_id {
            form.push(("discounts[0][coupon]".to_string(), coupon_id.to_string()));
        } else {
            // Mutually exclusive with explicit discounts in Stripe's API.
            form.push((
                "allow_promotion_codes".to_string(),
                "true".to_string(),
            ));
        }

        let session: StripeCheckoutSession = self
            .stripe_request(reqwest::Method::POST, "/checkout/sessions", Some(&form))
            .await?;

        Ok(CheckoutSession {
            session_id: session.id,
            url: session.url.unwrap_or_default(),
        })
    }

    #[instrument(skip(self))]
    async fn create_portal_session(&self, customer_id: &str) -> Result<String, BillingError> {
        debug!(customer_id = %customer_id, "Creating portal session");

        let form = [
            ("customer".to_string(), customer_id.to_string()),
            ("return_url".to_string(), self.config.portal_return_url()),
        ];

        let session: StripeBillingPortalSession = self
            .stripe_request(
                reqwest::Method::POST,
                "/billing_portal/sessions",
                Some(&form),
            )
            .await?;

        Ok(session.url)
    }

    #[instrument(skip(self))]
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, BillingError> {
        debug!(subscription_id = %subscription_id, "Getting Stripe subscription");

        self.stripe_request::<StripeSubscription>(
            reqwest::Method::GET,
            &format!("/subscriptions/{subscription_id}"),
            None,
        )
        .await
    }
}

// Stripe API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub current_period_start: i64,
    pub current_period_end: i64,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub customer: Option<String>,
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeBillingPortalSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeCoupon {
    pub id: String,
    pub valid: bool,
    pub name: Option<String>,
}
