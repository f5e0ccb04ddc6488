//! Billing errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    /// No Stripe customer is linked to the user yet.
    #[error("customer not found")]
    CustomerNotFound,

    /// No price is configured for the requested plan.
    #[error("no price configured for plan")]
    UnknownPlan,

    /// Coupon code rejected at checkout.
    #[error("Invalid voucher code")]
    InvalidVoucher,

    /// Stripe returned an error.
    #[error("provider error: {0}")]
    ProviderError(String),

    /// Webhook verification or parsing failed.
    #[error("webhook error: {0}")]
    WebhookError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BillingError {
    pub fn is_provider_error(&self) -> bool {
        matches!(self, Self::ProviderError(_))
    }

    /// Whether the error is the caller's fault rather than ours or Stripe's.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::CustomerNotFound | Self::UnknownPlan | Self::InvalidVoucher
        )
    }
}
