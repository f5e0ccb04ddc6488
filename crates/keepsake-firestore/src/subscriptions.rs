//! Subscription repository.
//!
//! One document per user at `subscriptions/{user_id}` carrying the plan,
//! Stripe linkage, and the storage usage counter. Writes that race (webhooks
//! vs. API requests) go through updateTime preconditions with bounded retry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use keepsake_models::{PlanChange, PlanTier, SubscriptionRecord, STATUS_INACTIVE};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{
    Document, FromFirestoreValue, StructuredQuery, ToFirestoreValue, Value,
};

/// Collection holding one subscription document per user.
const SUBSCRIPTIONS_COLLECTION: &str = "subscriptions";

/// Maximum retries for precondition-guarded updates.
const MAX_UPDATE_RETRIES: u32 = 5;

/// Outcome of an atomic storage reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOutcome {
    /// The increment was applied; `used_mb` is the new total.
    Granted { used_mb: u64 },
    /// The increment would exceed the plan ceiling; nothing was written.
    Denied { used_mb: u64 },
}

impl StorageOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, StorageOutcome::Granted { .. })
    }

    pub fn used_mb(&self) -> u64 {
        match self {
            StorageOutcome::Granted { used_mb } | StorageOutcome::Denied { used_mb } => *used_mb,
        }
    }
}

/// Repository for subscription documents.
#[derive(Clone)]
pub struct SubscriptionRepository {
    client: FirestoreClient,
}

impl SubscriptionRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Get a user's subscription. Returns `None` if no record exists.
    pub async fn get(&self, user_id: &str) -> FirestoreResult<Option<SubscriptionRecord>> {
        let doc = self
            .client
            .get_document(SUBSCRIPTIONS_COLLECTION, user_id)
            .await?;

        match doc {
            Some(d) => Ok(Some(document_to_subscription(&d)?)),
            None => Ok(None),
        }
    }

    /// Get or create the user's subscription.
    ///
    /// New users land on the free plan with an inactive billing status.
    /// Creation is race-safe: losing the create race re-reads the winner.
    pub async fn ensure(&self, user_id: &str) -> FirestoreResult<SubscriptionRecord> {
        if let Some(record) = self.get(user_id).await? {
            return Ok(record);
        }

        let record = SubscriptionRecord::new(user_id);
        let fields = subscription_to_fields(&record);

        match self
            .client
            .create_document(SUBSCRIPTIONS_COLLECTION, user_id, fields)
            .await
        {
            Ok(_) => {
                info!("Created subscription record for user: {}", user_id);
                Ok(record)
            }
            Err(FirestoreError::AlreadyExists(_)) => {
                // Another request created it first.
                self.get(user_id).await?.ok_or_else(|| {
                    FirestoreError::request_failed(format!(
                        "Subscription for {} vanished after create conflict",
                        user_id
                    ))
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Find the subscription owning a Stripe customer id.
    ///
    /// Used by webhook events whose metadata does not carry the user id.
    pub async fn find_by_customer(
        &self,
        customer_id: &str,
    ) -> FirestoreResult<Option<SubscriptionRecord>> {
        let query = StructuredQuery::collection(SUBSCRIPTIONS_COLLECTION)
            .where_eq("stripe_customer_id", customer_id.to_firestore_value())
            .limit(1);

        let docs = self.client.run_query("", query).await?;
        match docs.first() {
            Some(d) => Ok(Some(document_to_subscription(d)?)),
            None => Ok(None),
        }
    }

    /// Record the Stripe customer id on a user's subscription.
    pub async fn set_customer_id(&self, user_id: &str, customer_id: &str) -> FirestoreResult<()> {
        self.ensure(user_id).await?;

        let mut fields = HashMap::new();
        fields.insert(
            "stripe_customer_id".to_string(),
            customer_id.to_firestore_value(),
        );
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

        let mask: Vec<String> = fields.keys().cloned().collect();
        self.client
            .update_document(SUBSCRIPTIONS_COLLECTION, user_id, fields, Some(mask))
            .await?;
        Ok(())
    }

    /// Apply a plan change from a billing event.
    ///
    /// Only the fields named by the change are touched, so a concurrent
    /// storage increment on the same document is never clobbered.
    pub async fn apply_plan_change(
        &self,
        user_id: &str,
        change: &PlanChange,
    ) -> FirestoreResult<SubscriptionRecord> {
        self.ensure(user_id).await?;

        let mut fields = HashMap::new();
        fields.insert("plan".to_string(), change.plan.as_str().to_firestore_value());
        fields.insert("status".to_string(), change.status.to_firestore_value());
        if let Some(customer_id) = &change.stripe_customer_id {
            fields.insert(
                "stripe_customer_id".to_string(),
                customer_id.to_firestore_value(),
            );
        }
        if let Some(subscription_id) = &change.stripe_subscription_id {
            // Outer Some means "set the field"; inner None clears it.
            fields.insert(
                "stripe_subscription_id".to_string(),
                subscription_id.to_firestore_value(),
            );
        }
        if let Some(period_end) = change.current_period_end {
            fields.insert(
                "current_period_end".to_string(),
                period_end.to_firestore_value(),
            );
        }
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

        let mask: Vec<String> = fields.keys().cloned().collect();
        let doc = self
            .client
            .update_document(SUBSCRIPTIONS_COLLECTION, user_id, fields, Some(mask))
            .await?;

        info!(
            user_id = %user_id,
            plan = %change.plan.as_str(),
            status = %change.status,
            "Applied plan change"
        );
        document_to_subscription(&doc)
    }

    /// Atomically reserve storage against a plan ceiling.
    ///
    /// Reads the current counter, checks `used + delta <= limit`, and writes
    /// the incremented value guarded by the document's updateTime. A losing
    /// race retries with backoff; the ceiling check is re-evaluated against
    /// the fresh counter each attempt.
    pub async fn try_add_storage(
        &self,
        user_id: &str,
        delta_mb: u64,
        limit_mb: u64,
    ) -> FirestoreResult<StorageOutcome> {
        let mut last_error = None;

        for attempt in 0..MAX_UPDATE_RETRIES {
            let doc = self
                .client
                .get_document(SUBSCRIPTIONS_COLLECTION, user_id)
                .await?;

            let (record, update_time) = match doc {
                Some(d) => (document_to_subscription(&d)?, d.update_time.clone()),
                None => {
                    self.ensure(user_id).await?;
                    continue;
                }
            };

            let used_mb = record.storage_used_mb;
            let new_used = used_mb.saturating_add(delta_mb);
            if new_used > limit_mb {
                return Ok(StorageOutcome::Denied { used_mb });
            }

            let mut fields = HashMap::new();
            fields.insert("storage_used_mb".to_string(), new_used.to_firestore_value());
            fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());
            let mask: Vec<String> = fields.keys().cloned().collect();

            match self
                .client
                .update_document_with_precondition(
                    SUBSCRIPTIONS_COLLECTION,
                    user_id,
                    fields,
                    Some(mask),
                    update_time.as_deref(),
                )
                .await
            {
                Ok(_) => return Ok(StorageOutcome::Granted { used_mb: new_used }),
                Err(e) if e.is_precondition_failed() => {
                    debug!(
                        "Storage increment precondition failed for {} (attempt {}), retrying",
                        user_id,
                        attempt + 1
                    );
                    last_error = Some(e);
                    tokio::time::sleep(std::time::Duration::from_millis(
                        50 * (attempt as u64 + 1),
                    ))
                    .await;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            "Storage increment failed after {} retries for {}: {:?}",
            MAX_UPDATE_RETRIES, user_id, last_error
        );
        Err(FirestoreError::request_failed(format!(
            "Failed to update storage usage after {} retries",
            MAX_UPDATE_RETRIES
        )))
    }
}

// ============================================================================
// Field Mapping
// ============================================================================

fn subscription_to_fields(record: &SubscriptionRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();

    fields.insert("user_id".to_string(), record.user_id.to_firestore_value());
    fields.insert("plan".to_string(), record.plan.as_str().to_firestore_value());
    fields.insert("status".to_string(), record.status.to_firestore_value());
    fields.insert(
        "stripe_customer_id".to_string(),
        record.stripe_customer_id.to_firestore_value(),
    );
    fields.insert(
        "stripe_subscription_id".to_string(),
        record.stripe_subscription_id.to_firestore_value(),
    );
    fields.insert(
        "current_period_end".to_string(),
        record.current_period_end.to_firestore_value(),
    );
    fields.insert(
        "storage_used_mb".to_string(),
        record.storage_used_mb.to_firestore_value(),
    );
    if !record.metadata.is_empty() {
        fields.insert("metadata".to_string(), record.metadata.to_firestore_value());
    }
    fields.insert(
        "created_at".to_string(),
        record.created_at.to_firestore_value(),
    );
    fields.insert(
        "updated_at".to_string(),
        record.updated_at.to_firestore_value(),
    );

    fields
}

fn document_to_subscription(doc: &Document) -> FirestoreResult<SubscriptionRecord> {
    let fields = doc
        .fields
        .as_ref()
        .ok_or_else(|| FirestoreError::InvalidResponse("Document has no fields".to_string()))?;

    let get_string = |key: &str| -> Option<String> {
        fields.get(key).and_then(String::from_firestore_value)
    };
    let get_u64 = |key: &str| -> u64 {
        fields
            .get(key)
            .and_then(u64::from_firestore_value)
            .unwrap_or(0)
    };
    let get_time = |key: &str| -> Option<DateTime<Utc>> {
        fields.get(key).and_then(DateTime::from_firestore_value)
    };

    let user_id = get_string("user_id")
        .or_else(|| doc.doc_id().map(str::to_string))
        .ok_or_else(|| {
            FirestoreError::InvalidResponse("Subscription document has no user_id".to_string())
        })?;

    let metadata = match fields.get("metadata") {
        Some(Value::MapValue(map)) => map
            .fields
            .as_ref()
            .map(|f| {
                f.iter()
                    .filter_map(|(k, v)| {
                        String::from_firestore_value(v).map(|s| (k.clone(), s))
                    })
                    .collect()
            })
            .unwrap_or_default(),
        _ => HashMap::new(),
    };

    Ok(SubscriptionRecord {
        user_id,
        plan: get_string("plan")
            .map(|s| PlanTier::from_str(&s))
            .unwrap_or_default(),
        status: get_string("status").unwrap_or_else(|| STATUS_INACTIVE.to_string()),
        stripe_customer_id: get_string("stripe_customer_id"),
        stripe_subscription_id: get_string("stripe_subscription_id"),
        current_period_end: get_time("current_period_end"),
        storage_used_mb: get_u64("storage_used_mb"),
        metadata,
        created_at: get_time("created_at").unwrap_or_else(Utc::now),
        updated_at: get_time("updated_at").unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(fields: HashMap<String, Value>) -> Document {
        Document {
            name: Some(
                "projects/p/databases/(default)/documents/subscriptions/user-1".to_string(),
            ),
            fields: Some(fields),
            create_time: None,
            update_time: Some("2026-01-01T00:00:00Z".to_string()),
        }
    }

    #[test]
    fn test_subscription_round_trip() {
        let record = SubscriptionRecord::new("user-1");
        let fields = subscription_to_fields(&record);
        let parsed = document_to_subscription(&doc_with(fields)).unwrap();

        assert_eq!(parsed.user_id, "user-1");
        assert_eq!(parsed.plan, PlanTier::Free);
        assert_eq!(parsed.status, STATUS_INACTIVE);
        assert_eq!(parsed.storage_used_mb, 0);
        assert!(parsed.stripe_customer_id.is_none());
    }

    #[test]
    fn test_user_id_falls_back_to_document_id() {
        let mut fields = HashMap::new();
        fields.insert("plan".to_string(), "premium".to_firestore_value());
        let parsed = document_to_subscription(&doc_with(fields)).unwrap();
        assert_eq!(parsed.user_id, "user-1");
        assert_eq!(parsed.plan, PlanTier::Premium);
    }

    #[test]
    fn test_unknown_plan_maps_to_free() {
        let mut fields = HashMap::new();
        fields.insert("user_id".to_string(), "user-1".to_firestore_value());
        fields.insert("plan".to_string(), "enterprise".to_firestore_value());
        let parsed = document_to_subscription(&doc_with(fields)).unwrap();
        assert_eq!(parsed.plan, PlanTier::Free);
    }

    #[test]
    fn test_storage_outcome_accessors() {
        let granted = StorageOutcome::Granted { used_mb: 10 };
        let denied = StorageOutcome::Denied { used_mb: 500 };
        assert!(granted.is_granted());
        assert!(!denied.is_granted());
        assert_eq!(granted.used_mb(), 10);
        assert_eq!(denied.used_mb(), 500);
    }
}
