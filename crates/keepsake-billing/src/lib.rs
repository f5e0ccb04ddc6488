//! Stripe billing bridge for Keepsake.
//!
//! Checkout and portal sessions, webhook signature verification, and the
//! mapping from Stripe events to plan changes. The rest of the system only
//! sees [`PaymentProvider`] and [`BillingEvent`].

pub mod config;
pub mod error;
pub mod provider;
pub mod stripe;
pub mod webhook;

pub use config::BillingConfig;
pub use error::BillingError;
pub use provider::PaymentProvider;
pub use stripe::StripeProvider;
pub use webhook::{BillingEvent, WebhookEvent, WebhookHandler};

/// A created checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// Per-request checkout parameters.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutParams<'a> {
    /// User the subscription belongs to, stamped into metadata.
    pub user_id: &'a str,
    /// Pre-validated Stripe coupon to apply, if a voucher was redeemed.
    pub stripe_coupon_id: Option<&'a str>,
}
