//! Per-user subscription record and its typed update payloads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::plan::PlanTier;

/// Billing status used before any checkout has happened.
pub const STATUS_INACTIVE: &str = "inactive";

/// One record per user, keyed by `user_id`.
///
/// Two independent writers mutate this record: the user's own requests
/// (storage commits) and the billing bridge (plan changes). The fields they
/// touch are disjoint; `storage_used_mb` only ever grows.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubscriptionRecord {
    pub user_id: String,
    pub plan: PlanTier,
    /// Free-text mirror of the provider's subscription status
    /// (`active`, `canceled`, `inactive`, ...).
    pub status: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub storage_used_mb: u64,
    /// Opaque key-value bag carried along with the record.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// The default record written by the idempotent ensure operation.
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            plan: PlanTier::Free,
            status: STATUS_INACTIVE.to_string(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            current_period_end: None,
            storage_used_mb: 0,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Plan-field update applied by the billing bridge only.
///
/// Explicitly does not carry `storage_used_mb`: plan changes and storage
/// accounting are separate write paths with disjoint field ownership.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanChange {
    pub plan: PlanTier,
    pub status: String,
    pub stripe_customer_id: Option<String>,
    /// `Some(None)` clears a stored subscription id (cancellation).
    pub stripe_subscription_id: Option<Option<String>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl PlanChange {
    /// The change applied when the provider reports cancellation/deletion.
    pub fn canceled(status: impl Into<String>, customer_id: Option<String>) -> Self {
        Self {
            plan: PlanTier::Free,
            status: status.into(),
            stripe_customer_id: customer_id,
            stripe_subscription_id: Some(None),
            current_period_end: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let rec = SubscriptionRecord::new("user-1");
        assert_eq!(rec.plan, PlanTier::Free);
        assert_eq!(rec.status, STATUS_INACTIVE);
        assert_eq!(rec.storage_used_mb, 0);
        assert!(rec.stripe_customer_id.is_none());
    }

    #[test]
    fn test_canceled_change_downgrades_to_free() {
        let change = PlanChange::canceled("canceled", Some("cus_1".into()));
        assert_eq!(change.plan, PlanTier::Free);
        assert_eq!(change.stripe_subscription_id, Some(None));
    }
}
