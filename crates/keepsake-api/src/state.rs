//! Application state.

use std::sync::Arc;

use tracing::warn;

use keepsake_billing::{BillingConfig, StripeProvider, WebhookHandler};
use keepsake_firestore::FirestoreClient;

use crate::auth::JwksCache;
use crate::config::ApiConfig;
use crate::services::EntitlementService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub firestore: Arc<FirestoreClient>,
    pub jwks: Arc<JwksCache>,
    /// None when Stripe env vars are absent; billing endpoints then
    /// respond with a configuration error instead of failing at boot.
    pub billing: Option<Arc<StripeProvider>>,
    pub webhook: Option<WebhookHandler>,
    pub entitlements: EntitlementService,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let firestore = Arc::new(FirestoreClient::from_env().await?);
        let jwks = Arc::new(JwksCache::new().await?);

        let (billing, webhook) = match BillingConfig::from_env()? {
            Some(billing_config) => {
                let webhook = WebhookHandler::new(billing_config.stripe_webhook_secret.clone());
                (
                    Some(Arc::new(StripeProvider::new(billing_config))),
                    Some(webhook),
                )
            }
            None => {
                warn!("STRIPE_SECRET_KEY not set, billing endpoints disabled");
                (None, None)
            }
        };

        let entitlements = EntitlementService::new(Arc::clone(&firestore));

        Ok(Self {
            config,
            firestore,
            jwks,
            billing,
            webhook,
            entitlements,
        })
    }
}
