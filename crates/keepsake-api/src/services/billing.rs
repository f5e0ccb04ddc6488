//! Billing event application.
//!
//! Turns verified Stripe events into subscription plan changes. Every event
//! id passes through the dedup ledger first; Stripe redelivers events and
//! plan changes must not be applied twice. When applying an event fails,
//! its ledger entry is removed again so the redelivery gets a clean retry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeZone;
use tracing::{info, warn};

use keepsake_billing::{BillingEvent, PaymentProvider, StripeProvider, WebhookEvent};
use keepsake_firestore::{FirestoreClient, SubscriptionRepository, WebhookEventRepository};
use keepsake_models::{PlanChange, PlanTier, SubscriptionRecord};

use crate::error::ApiResult;
use crate::metrics::record_webhook_event;

/// Subscription statuses that terminate the paid plan.
fn is_terminal_status(status: &str) -> bool {
    matches!(status, "canceled" | "incomplete_expired" | "unpaid")
}

/// Dedup ledger for webhook event ids.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventLedger: Send + Sync {
    /// Record an event id. `false` means the event was seen before.
    async fn record(&self, event_id: &str, event_type: &str) -> ApiResult<bool>;
    /// Drop a recorded event id after a failed apply.
    async fn remove(&self, event_id: &str) -> ApiResult<()>;
}

/// Subscription state touched by billing events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn ensure(&self, user_id: &str) -> ApiResult<SubscriptionRecord>;
    async fn find_by_customer(&self, customer_id: &str)
        -> ApiResult<Option<SubscriptionRecord>>;
    async fn apply_plan_change(
        &self,
        user_id: &str,
        change: &PlanChange,
    ) -> ApiResult<SubscriptionRecord>;
}

#[async_trait]
impl EventLedger for WebhookEventRepository {
    async fn record(&self, event_id: &str, event_type: &str) -> ApiResult<bool> {
        Ok(WebhookEventRepository::record(self, event_id, event_type).await?)
    }

    async fn remove(&self, event_id: &str) -> ApiResult<()> {
        Ok(WebhookEventRepository::remove(self, event_id).await?)
    }
}

#[async_trait]
impl SubscriptionStore for SubscriptionRepository {
    async fn ensure(&self, user_id: &str) -> ApiResult<SubscriptionRecord> {
        Ok(SubscriptionRepository::ensure(self, user_id).await?)
    }

    async fn find_by_customer(
        &self,
        customer_id: &str,
    ) -> ApiResult<Option<SubscriptionRecord>> {
        Ok(SubscriptionRepository::find_by_customer(self, customer_id).await?)
    }

    async fn apply_plan_change(
        &self,
        user_id: &str,
        change: &PlanChange,
    ) -> ApiResult<SubscriptionRecord> {
        Ok(SubscriptionRepository::apply_plan_change(self, user_id, change).await?)
    }
}

#[derive(Clone)]
pub struct BillingEventProcessor<S = SubscriptionRepository, E = WebhookEventRepository> {
    subscriptions: S,
    events: E,
}

impl BillingEventProcessor {
    pub fn new(firestore: Arc<FirestoreClient>) -> Self {
        Self {
            subscriptions: SubscriptionRepository::new((*firestore).clone()),
            events: WebhookEventRepository::new((*firestore).clone()),
        }
    }
}

impl<S: SubscriptionStore, E: EventLedger> BillingEventProcessor<S, E> {
    /// Apply a verified webhook event. Returns a short outcome label
    /// for logging and metrics.
    pub async fn process(
        &self,
        provider: Option<&Arc<StripeProvider>>,
        event: WebhookEvent,
    ) -> ApiResult<&'static str> {
        let outcome = self.process_inner(provider, &event).await?;
        record_webhook_event(&event.event_type, outcome);
        Ok(outcome)
    }

    async fn process_inner(
        &self,
        provider: Option<&Arc<StripeProvider>>,
        event: &WebhookEvent,
    ) -> ApiResult<&'static str> {
        // Dedup before any effect.
        if !self.events.record(&event.id, &event.event_type).await? {
            return Ok("duplicate");
        }

        match self.apply(provider, event).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Release the ledger entry so the redelivery is retried
                // instead of short-circuiting as a duplicate.
                if let Err(remove_err) = self.events.remove(&event.id).await {
                    warn!(
                        event_id = %event.id,
                        error = %remove_err,
                        "Failed to release dedup entry after apply error"
                    );
                }
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        provider: Option<&Arc<StripeProvider>>,
        event: &WebhookEvent,
    ) -> ApiResult<&'static str> {
        match &event.event {
            BillingEvent::CheckoutCompleted {
                session_id,
                customer_id,
                subscription_id,
                user_id,
                plan,
            } => {
                let Some(user_id) = self
                    .resolve_user(user_id.as_deref(), customer_id.as_deref())
                    .await?
                else {
                    warn!(session_id = %session_id, "Checkout completed with no resolvable user");
                    return Ok("unmatched");
                };

                let plan = plan.unwrap_or(PlanTier::Premium);

                // Pull live status and period end off the new subscription.
                let (status, current_period_end) = match (provider, subscription_id.as_deref()) {
                    (Some(provider), Some(sub_id)) => match provider.get_subscription(sub_id).await
                    {
                        Ok(sub) => (
                            sub.status,
                            chrono::Utc.timestamp_opt(sub.current_period_end, 0).single(),
                        ),
                        Err(e) => {
                            warn!(error = %e, "Failed to fetch subscription after checkout");
                            ("active".to_string(), None)
                        }
                    },
                    _ => ("active".to_string(), None),
                };

                let change = PlanChange {
                    plan,
                    status,
                    stripe_customer_id: customer_id.clone(),
                    stripe_subscription_id: Some(subscription_id.clone()),
                    current_period_end,
                };
                self.subscriptions.apply_plan_change(&user_id, &change).await?;

                info!(user_id = %user_id, plan = %plan, "Checkout completed, plan upgraded");
                Ok("applied")
            }

            BillingEvent::SubscriptionChanged {
                subscription_id,
                customer_id,
                status,
                current_period_end,
                user_id,
                plan,
                deleted,
            } => {
                let Some(user_id) = self
                    .resolve_user(user_id.as_deref(), Some(customer_id))
                    .await?
                else {
                    warn!(
                        subscription_id = %subscription_id,
                        customer_id = %customer_id,
                        "Subscription event with no resolvable user"
                    );
                    return Ok("unmatched");
                };

                let change = if *deleted || is_terminal_status(status) {
                    // Back to the free tier, dropping the subscription link.
                    PlanChange::canceled(status.clone(), Some(customer_id.clone()))
                } else {
                    // Keep the recorded plan when metadata does not name one.
                    let plan = match plan {
                        Some(p) => *p,
                        None => self.subscriptions.ensure(&user_id).await?.plan,
                    };
                    PlanChange {
                        plan,
                        status: status.clone(),
                        stripe_customer_id: Some(customer_id.clone()),
                        stripe_subscription_id: Some(Some(subscription_id.clone())),
                        current_period_end: *current_period_end,
                    }
                };

                self.subscriptions.apply_plan_change(&user_id, &change).await?;

                info!(
                    user_id = %user_id,
                    status = %status,
                    deleted = %deleted,
                    "Subscription state applied"
                );
                Ok("applied")
            }

            BillingEvent::Ignored => Ok("ignored"),
        }
    }

    /// Resolve the owning user: metadata first, reverse customer lookup
    /// as fallback for subscriptions created before metadata stamping.
    async fn resolve_user(
        &self,
        metadata_user: Option<&str>,
        customer_id: Option<&str>,
    ) -> ApiResult<Option<String>> {
        if let Some(uid) = metadata_user {
            if !uid.is_empty() {
                return Ok(Some(uid.to_string()));
            }
        }

        if let Some(customer_id) = customer_id {
            if let Some(record) = self.subscriptions.find_by_customer(customer_id).await? {
                return Ok(Some(record.user_id));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;

    fn subscription_changed(event_id: &str) -> WebhookEvent {
        WebhookEvent {
            id: event_id.to_string(),
            event_type: "customer.subscription.updated".to_string(),
            created: 1_700_000_000,
            event: BillingEvent::SubscriptionChanged {
                subscription_id: "sub_123".to_string(),
                customer_id: "cus_123".to_string(),
                status: "active".to_string(),
                current_period_end: None,
                user_id: Some("user-1".to_string()),
                plan: Some(PlanTier::Pro),
                deleted: false,
            },
        }
    }

    fn processor(
        subscriptions: MockSubscriptionStore,
        events: MockEventLedger,
    ) -> BillingEventProcessor<MockSubscriptionStore, MockEventLedger> {
        BillingEventProcessor {
            subscriptions,
            events,
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(is_terminal_status("canceled"));
        assert!(is_terminal_status("unpaid"));
        assert!(!is_terminal_status("active"));
        assert!(!is_terminal_status("past_due"));
    }

    #[tokio::test]
    async fn test_redelivered_event_applies_once() {
        let mut events = MockEventLedger::new();
        events
            .expect_record()
            .times(1)
            .returning(|_, _| Ok(true));
        events
            .expect_record()
            .times(1)
            .returning(|_, _| Ok(false));

        let mut subscriptions = MockSubscriptionStore::new();
        subscriptions
            .expect_apply_plan_change()
            .withf(|user_id, change| user_id == "user-1" && change.plan == PlanTier::Pro)
            .times(1)
            .returning(|user_id, _| Ok(SubscriptionRecord::new(user_id)));

        let processor = processor(subscriptions, events);
        let event = subscription_changed("evt_1");

        let first = processor.process(None, event.clone()).await.unwrap();
        assert_eq!(first, "applied");

        let second = processor.process(None, event).await.unwrap();
        assert_eq!(second, "duplicate");
    }

    #[tokio::test]
    async fn test_failed_apply_releases_dedup_entry() {
        let mut events = MockEventLedger::new();
        events.expect_record().times(1).returning(|_, _| Ok(true));
        events
            .expect_remove()
            .withf(|event_id| event_id == "evt_2")
            .times(1)
            .returning(|_| Ok(()));

        let mut subscriptions = MockSubscriptionStore::new();
        subscriptions
            .expect_apply_plan_change()
            .times(1)
            .returning(|_, _| Err(ApiError::Internal("firestore write failed".to_string())));

        let processor = processor(subscriptions, events);
        let result = processor.process(None, subscription_changed("evt_2")).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_deleted_subscription_cancels_plan() {
        let mut events = MockEventLedger::new();
        events.expect_record().returning(|_, _| Ok(true));

        let mut subscriptions = MockSubscriptionStore::new();
        subscriptions
            .expect_apply_plan_change()
            .withf(|_, change| change.plan == PlanTier::Free)
            .times(1)
            .returning(|user_id, _| Ok(SubscriptionRecord::new(user_id)));

        let event = WebhookEvent {
            id: "evt_3".to_string(),
            event_type: "customer.subscription.deleted".to_string(),
            created: 1_700_000_000,
            event: BillingEvent::SubscriptionChanged {
                subscription_id: "sub_123".to_string(),
                customer_id: "cus_123".to_string(),
                status: "canceled".to_string(),
                current_period_end: None,
                user_id: Some("user-1".to_string()),
                plan: None,
                deleted: true,
            },
        };

        let outcome = processor(subscriptions, events)
            .process(None, event)
            .await
            .unwrap();
        assert_eq!(outcome, "applied");
    }
}
