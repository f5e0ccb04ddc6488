//! Stripe webhook verification and parsing.
//!
//! Verifies the `Stripe-Signature` header (HMAC-SHA256 over
//! `"{timestamp}.{payload}"`, constant-time compare, freshness window)
//! and lifts the raw JSON into domain-level billing events.

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::{debug, error, info, instrument, warn};

use keepsake_models::PlanTier;

use crate::error::BillingError;
use crate::stripe::StripeSubscription;

/// Maximum age of a webhook timestamp, in seconds.
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// A verified webhook delivery.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Stripe event id, used for dedup.
    pub id: String,
    /// Raw event type string.
    pub event_type: String,
    /// When Stripe created the event (Unix timestamp).
    pub created: i64,
    /// Parsed domain event.
    pub event: BillingEvent,
}

/// Domain-level billing events.
#[derive(Debug, Clone)]
pub enum BillingEvent {
    /// A checkout finished; the user paid for a plan.
    CheckoutCompleted {
        session_id: String,
        customer_id: Option<String>,
        subscription_id: Option<String>,
        /// From session metadata; present for sessions this service created.
        user_id: Option<String>,
        plan: Option<PlanTier>,
    },
    /// A subscription changed state (created, updated, or deleted).
    SubscriptionChanged {
        subscription_id: String,
        customer_id: String,
        status: String,
        current_period_end: Option<DateTime<Utc>>,
        /// From subscription metadata, when the checkout stamped it.
        user_id: Option<String>,
        plan: Option<PlanTier>,
        /// True for customer.subscription.deleted.
        deleted: bool,
    },
    /// An event type this service does not act on.
    Ignored,
}

/// Webhook handler: verifies signatures and parses events.
#[derive(Clone)]
pub struct WebhookHandler {
    webhook_secret: String,
}

impl WebhookHandler {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Verify a payload's signature and parse it into a domain event.
    #[instrument(skip(self, payload, signature))]
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, BillingError> {
        self.verify_signature(payload, signature)?;

        let raw_event: RawStripeEvent = serde_json::from_slice(payload)
            .map_err(|e| BillingError::WebhookError(e.to_string()))?;

        debug!(event_id = %raw_event.id, event_type = %raw_event.event_type, "Parsed webhook event");

        let event = Self::parse_event(&raw_event.event_type, raw_event.data.object)?;

        Ok(WebhookEvent {
            id: raw_event.id,
            event_type: raw_event.event_type,
            created: raw_event.created,
            event,
        })
    }

    /// Verify the `Stripe-Signature` header.
    fn verify_signature(&self, payload: &[u8], signature: &str) -> Result<(), BillingError> {
        // Header format: t=timestamp,v1=signature
        let mut timestamp: Option<&str> = None;
        let mut sig_v1: Option<&str> = None;

        for part in signature.split(',') {
            if let Some((key, value)) = part.split_once('=') {
                match key.trim() {
                    "t" => timestamp = Some(value),
                    "v1" => sig_v1 = Some(value),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            warn!("Missing timestamp in webhook signature");
            BillingError::WebhookError("Missing timestamp".to_string())
        })?;

        let sig_v1 = sig_v1.ok_or_else(|| {
            warn!("Missing v1 signature in webhook signature");
            BillingError::WebhookError("Missing signature".to_string())
        })?;

        let signed_payload = format!(
            "{}.{}",
            timestamp,
            std::str::from_utf8(payload)
                .map_err(|_| BillingError::WebhookError("Invalid payload encoding".to_string()))?
        );

        let mut mac = Hmac::<Sha256>::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| BillingError::Internal("HMAC error".to_string()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        if !constant_time_eq(sig_v1.as_bytes(), expected.as_bytes()) {
            error!("Webhook signature verification failed");
            return Err(BillingError::WebhookError(
                "Signature verification failed".to_string(),
            ));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| BillingError::WebhookError("Invalid timestamp format".to_string()))?;
        let now = Utc::now().timestamp();
        if (now - ts).abs() > TIMESTAMP_TOLERANCE_SECS {
            warn!(timestamp = ts, now = now, "Webhook timestamp outside tolerance");
            return Err(BillingError::WebhookError("Timestamp too old".to_string()));
        }

        Ok(())
    }

    fn parse_event(
        event_type: &str,
        object: serde_json::Value,
    ) -> Result<BillingEvent, BillingError> {
        match event_type {
            "checkout.session.completed" => {
                let session: RawCheckoutSession = serde_json::from_value(object)
                    .map_err(|e| BillingError::WebhookError(e.to_string()))?;
                Ok(BillingEvent::CheckoutCompleted {
                    session_id: session.id,
                    customer_id: session.customer,
                    subscription_id: session.subscription,
                    user_id: session.metadata.get("user_id").cloned(),
                    plan: session
                        .metadata
                        .get("plan")
                        .map(|s| PlanTier::from_str(s)),
                })
            }
            "customer.subscription.created"
            | "customer.subscription.updated"
            | "customer.subscription.deleted" => {
                let sub: StripeSubscription = serde_json::from_value(object)
                    .map_err(|e| BillingError::WebhookError(e.to_string()))?;
                Ok(BillingEvent::SubscriptionChanged {
                    subscription_id: sub.id,
                    customer_id: sub.customer,
                    status: sub.status,
                    current_period_end: Utc.timestamp_opt(sub.current_period_end, 0).single(),
                    user_id: sub.metadata.get("user_id").cloned(),
                    plan: sub.metadata.get("plan").map(|s| PlanTier::from_str(s)),
                    deleted: event_type == "customer.subscription.deleted",
                })
            }
            other => {
                info!(event_type = %other, "Ignoring webhook event type");
                Ok(BillingEvent::Ignored)
            }
        }
    }
}

/// Constant-time comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

// Raw Stripe event shapes

#[derive(Debug, Deserialize)]
struct RawStripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
    created: i64,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawCheckoutSession {
    id: String,
    customer: Option<String>,
    subscription: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &str, timestamp: i64) -> String {
        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn checkout_payload() -> String {
        serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "created": Utc::now().timestamp(),
            "data": {
                "object": {
                    "id": "cs_test_1",
                    "customer": "cus_1",
                    "subscription": "sub_1",
                    "metadata": { "user_id": "user-1", "plan": "premium" }
                }
            }
        })
        .to_string()
    }

    #[test]
    fn test_valid_signature_parses_checkout() {
        let handler = WebhookHandler::new(SECRET);
        let payload = checkout_payload();
        let sig = sign(&payload, Utc::now().timestamp());

        let event = handler.verify_and_parse(payload.as_bytes(), &sig).unwrap();
        assert_eq!(event.id, "evt_1");
        match event.event {
            BillingEvent::CheckoutCompleted {
                session_id,
                customer_id,
                user_id,
                plan,
                ..
            } => {
                assert_eq!(session_id, "cs_test_1");
                assert_eq!(customer_id.as_deref(), Some("cus_1"));
                assert_eq!(user_id.as_deref(), Some("user-1"));
                assert_eq!(plan, Some(PlanTier::Premium));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let handler = WebhookHandler::new(SECRET);
        let payload = checkout_payload();
        let sig = sign(&payload, Utc::now().timestamp());
        let tampered = payload.replace("premium", "freeeee");

        assert!(handler.verify_and_parse(tampered.as_bytes(), &sig).is_err());
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let handler = WebhookHandler::new(SECRET);
        let payload = checkout_payload();
        let old = Utc::now().timestamp() - TIMESTAMP_TOLERANCE_SECS - 60;
        let sig = sign(&payload, old);

        assert!(handler.verify_and_parse(payload.as_bytes(), &sig).is_err());
    }

    #[test]
    fn test_missing_signature_parts() {
        let handler = WebhookHandler::new(SECRET);
        let payload = checkout_payload();
        assert!(handler
            .verify_and_parse(payload.as_bytes(), "t=123")
            .is_err());
        assert!(handler
            .verify_and_parse(payload.as_bytes(), "v1=deadbeef")
            .is_err());
    }

    #[test]
    fn test_subscription_deleted_event() {
        let handler = WebhookHandler::new(SECRET);
        let payload = serde_json::json!({
            "id": "evt_2",
            "type": "customer.subscription.deleted",
            "created": Utc::now().timestamp(),
            "data": {
                "object": {
                    "id": "sub_1",
                    "customer": "cus_1",
                    "status": "canceled",
                    "current_period_start": 1_700_000_000,
                    "current_period_end": 1_702_592_000,
                    "metadata": {}
                }
            }
        })
        .to_string();
        let sig = sign(&payload, Utc::now().timestamp());

        let event = handler.verify_and_parse(payload.as_bytes(), &sig).unwrap();
        match event.event {
            BillingEvent::SubscriptionChanged {
                customer_id,
                status,
                deleted,
                user_id,
                ..
            } => {
                assert_eq!(customer_id, "cus_1");
                assert_eq!(status, "canceled");
                assert!(deleted);
                assert!(user_id.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let handler = WebhookHandler::new(SECRET);
        let payload = serde_json::json!({
            "id": "evt_3",
            "type": "invoice.paid",
            "created": Utc::now().timestamp(),
            "data": { "object": {} }
        })
        .to_string();
        let sig = sign(&payload, Utc::now().timestamp());

        let event = handler.verify_and_parse(payload.as_bytes(), &sig).unwrap();
        assert!(matches!(event.event, BillingEvent::Ignored));
        assert_eq!(event.event_type, "invoice.paid");
    }
}
