//! Billing configuration.

use std::collections::HashMap;

use keepsake_models::PlanTier;

use crate::error::BillingError;

/// Stripe configuration for checkout, portal, and webhooks.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// Map of paid plans to Stripe price IDs
    pub price_ids: HashMap<PlanTier, String>,
    /// Base URL of the web app, for checkout redirect URLs
    pub app_base_url: String,
}

impl BillingConfig {
    pub fn new(
        stripe_secret_key: impl Into<String>,
        stripe_webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            stripe_secret_key: stripe_secret_key.into(),
            stripe_webhook_secret: stripe_webhook_secret.into(),
            price_ids: HashMap::new(),
            app_base_url: "http://localhost:3000".to_string(),
        }
    }

    /// Set the price ID for a plan.
    pub fn with_price(mut self, plan: PlanTier, price_id: impl Into<String>) -> Self {
        self.price_ids.insert(plan, price_id.into());
        self
    }

    /// Set the app base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.app_base_url = base_url.into();
        self
    }

    /// Get the price ID for a plan.
    pub fn price_id(&self, plan: PlanTier) -> Option<&str> {
        self.price_ids.get(&plan).map(String::as_str)
    }

    /// Checkout redirect target after a successful payment.
    pub fn success_url(&self) -> String {
        format!("{}/account?checkout=success", self.app_base_url)
    }

    /// Checkout redirect target after an abandoned payment.
    pub fn cancel_url(&self) -> String {
        format!("{}/account?checkout=cancelled", self.app_base_url)
    }

    /// Return target for the customer portal.
    pub fn portal_return_url(&self) -> String {
        format!("{}/account", self.app_base_url)
    }

    /// Build config from environment variables.
    ///
    /// Returns `Ok(None)` when STRIPE_SECRET_KEY is absent: the service
    /// still boots, and billing endpoints report themselves unconfigured.
    /// A secret key without STRIPE_WEBHOOK_SECRET is an error, since it
    /// would leave webhook deliveries unverifiable.
    pub fn from_env() -> Result<Option<Self>, BillingError> {
        let Ok(stripe_secret_key) = std::env::var("STRIPE_SECRET_KEY") else {
            return Ok(None);
        };
        let stripe_webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                BillingError::Internal(
                    "STRIPE_WEBHOOK_SECRET must be set when STRIPE_SECRET_KEY is".to_string(),
                )
            })?;

        let mut config = Self::new(stripe_secret_key, stripe_webhook_secret);

        if let Ok(base_url) = std::env::var("APP_BASE_URL") {
            config.app_base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Ok(price) = std::env::var("STRIPE_PRO_MONTHLY_PRICE_ID") {
            config.price_ids.insert(PlanTier::Pro, price);
        }
        if let Ok(price) = std::env::var("STRIPE_PREMIUM_MONTHLY_PRICE_ID") {
            config.price_ids.insert(PlanTier::Premium, price);
        }

        Ok(Some(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_price_lookup() {
        let config = BillingConfig::new("sk_test_x", "whsec_x")
            .with_price(PlanTier::Premium, "price_123");
        assert_eq!(config.price_id(PlanTier::Premium), Some("price_123"));
        assert_eq!(config.price_id(PlanTier::Pro), None);
        assert_eq!(config.price_id(PlanTier::Free), None);
    }

    #[test]
    fn test_redirect_urls() {
        let config =
            BillingConfig::new("sk", "ws").with_base_url("https://keepsake.example.com");
        assert_eq!(
            config.success_url(),
            "https://keepsake.example.com/account?checkout=success"
        );
        assert_eq!(
            config.portal_return_url(),
            "https://keepsake.example.com/account"
        );
    }

    #[test]
    #[serial]
    fn test_from_env_requires_secret_key() {
        std::env::remove_var("STRIPE_SECRET_KEY");
        assert!(BillingConfig::from_env().unwrap().is_none());

        std::env::set_var("STRIPE_SECRET_KEY", "sk_test_y");
        std::env::set_var("STRIPE_WEBHOOK_SECRET", "whsec_y");
        std::env::set_var("STRIPE_PREMIUM_MONTHLY_PRICE_ID", "price_premium");
        std::env::set_var("APP_BASE_URL", "https://app.example.com/");
        let config = BillingConfig::from_env().unwrap().unwrap();
        assert_eq!(config.price_id(PlanTier::Premium), Some("price_premium"));
        assert_eq!(config.app_base_url, "https://app.example.com");
        std::env::remove_var("STRIPE_SECRET_KEY");
        std::env::remove_var("STRIPE_WEBHOOK_SECRET");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_missing_webhook_secret() {
        std::env::set_var("STRIPE_SECRET_KEY", "sk_test_z");
        std::env::remove_var("STRIPE_WEBHOOK_SECRET");
        assert!(BillingConfig::from_env().is_err());

        // An empty value is as unverifiable as an absent one.
        std::env::set_var("STRIPE_WEBHOOK_SECRET", "");
        assert!(BillingConfig::from_env().is_err());

        std::env::remove_var("STRIPE_SECRET_KEY");
        std::env::remove_var("STRIPE_WEBHOOK_SECRET");
    }
}
