//! Webhook event dedup ledger.
//!
//! Stripe retries webhook deliveries, so every event is recorded at
//! `stripe_webhook_events/{event_id}` with a create-only write before its
//! effects are applied. Losing the create means the event was already
//! processed and must be skipped.

use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{ToFirestoreValue, Value};

const WEBHOOK_EVENTS_COLLECTION: &str = "stripe_webhook_events";

#[derive(Clone)]
pub struct WebhookEventRepository {
    client: FirestoreClient,
}

impl WebhookEventRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Record an event id. Returns `false` if the event was seen before,
    /// in which case the caller must not apply its effects again.
    pub async fn record(&self, event_id: &str, event_type: &str) -> FirestoreResult<bool> {
        let mut fields: HashMap<String, Value> = HashMap::new();
        fields.insert("event_type".to_string(), event_type.to_firestore_value());
        fields.insert("received_at".to_string(), Utc::now().to_firestore_value());

        match self
            .client
            .create_document(WEBHOOK_EVENTS_COLLECTION, event_id, fields)
            .await
        {
            Ok(_) => Ok(true),
            Err(FirestoreError::AlreadyExists(_)) => {
                debug!(event_id = %event_id, "Duplicate webhook event, skipping");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop a recorded event id.
    ///
    /// Called when applying the event's effects failed after the create-only
    /// write, so the provider's redelivery is not mistaken for a duplicate.
    pub async fn remove(&self, event_id: &str) -> FirestoreResult<()> {
        self.client
            .delete_document(WEBHOOK_EVENTS_COLLECTION, event_id)
            .await
    }
}
