//! Entitlement service: plan limits enforced against live usage.
//!
//! Every quota decision starts from the user's subscription record (created
//! on first touch) and the static limits of its plan tier. Counts are read
//! fresh per decision; the storage counter is the one dimension that also
//! has an atomic reservation path.

use std::sync::Arc;

use keepsake_firestore::{
    FirestoreClient, StorageOutcome, StoryRepository, SubscriptionRepository,
};
use keepsake_models::{mb_for_bytes, PlanLimits, QuotaDimension, UsageSnapshot};

use crate::error::{ApiError, ApiResult};
use crate::metrics::record_quota_check;

/// Reject absurd storage requests before doing any arithmetic (10 GB).
const MAX_SINGLE_UPLOAD_BYTES: u64 = 10 * 1024 * 1024 * 1024;

#[derive(Clone)]
pub struct EntitlementService {
    firestore: Arc<FirestoreClient>,
    subscriptions: SubscriptionRepository,
}

/// Result of a storage allowance check or reservation.
#[derive(Debug, Clone, Copy)]
pub struct StorageDecision {
    pub allowed: bool,
    pub used_mb: u64,
    pub limit_mb: u64,
    pub requested_mb: u64,
}

impl EntitlementService {
    pub fn new(firestore: Arc<FirestoreClient>) -> Self {
        let subscriptions = SubscriptionRepository::new((*firestore).clone());
        Self {
            firestore,
            subscriptions,
        }
    }

    pub fn subscriptions(&self) -> &SubscriptionRepository {
        &self.subscriptions
    }

    fn stories(&self, user_id: &str) -> StoryRepository {
        StoryRepository::new((*self.firestore).clone(), user_id)
    }

    /// Current usage across all quota dimensions.
    pub async fn current_usage(&self, user_id: &str) -> ApiResult<UsageSnapshot> {
        let record = self.subscriptions.ensure(user_id).await?;
        let limits = PlanLimits::for_tier(record.plan);

        let stories = self.stories(user_id);
        let all = stories.list(keepsake_firestore::StoryScope::All).await?;
        let story_count = all.len() as u32;
        let video_count = all.iter().filter(|s| s.is_video()).count() as u32;

        Ok(UsageSnapshot {
            plan: record.plan,
            status: record.status,
            story_count,
            video_count,
            storage_used_mb: record.storage_used_mb,
            limits,
            current_period_end: record.current_period_end,
        })
    }

    /// Authorize creating a story, optionally one carrying video media.
    ///
    /// Checks the story ceiling first, then the video ceiling, matching
    /// the order a user would expect the rejection in.
    pub async fn authorize_story_creation(&self, user_id: &str, is_video: bool) -> ApiResult<()> {
        let usage = self.current_usage(user_id).await?;

        let story_ok = usage.limits.allows_story(usage.story_count);
        record_quota_check(QuotaDimension::Stories.as_str(), story_ok);
        if !story_ok {
            return Err(ApiError::QuotaExceeded(QuotaDimension::Stories));
        }

        if is_video {
            let video_ok = usage.limits.allows_video(usage.video_count);
            record_quota_check(QuotaDimension::Videos.as_str(), video_ok);
            if !video_ok {
                return Err(ApiError::QuotaExceeded(QuotaDimension::Videos));
            }
        }

        Ok(())
    }

    /// Authorize use of recipient features (plan-gated).
    pub async fn authorize_recipients(&self, user_id: &str) -> ApiResult<()> {
        let record = self.subscriptions.ensure(user_id).await?;
        let limits = PlanLimits::for_tier(record.plan);
        if !limits.recipients_enabled {
            return Err(ApiError::forbidden(
                "Recipients are not available on your plan",
            ));
        }
        Ok(())
    }

    /// Check whether `bytes` of storage would fit, without reserving.
    pub async fn check_storage(&self, user_id: &str, bytes: u64) -> ApiResult<StorageDecision> {
        let requested_mb = self.validated_mb(bytes)?;
        let record = self.subscriptions.ensure(user_id).await?;
        let limits = PlanLimits::for_tier(record.plan);

        let allowed = limits.storage_fits(record.storage_used_mb, requested_mb);
        record_quota_check(QuotaDimension::Storage.as_str(), allowed);

        Ok(StorageDecision {
            allowed,
            used_mb: record.storage_used_mb,
            limit_mb: limits.max_storage_mb,
            requested_mb,
        })
    }

    /// Atomically reserve `bytes` of storage against the plan ceiling.
    pub async fn reserve_storage(&self, user_id: &str, bytes: u64) -> ApiResult<StorageDecision> {
        let requested_mb = self.validated_mb(bytes)?;
        let record = self.subscriptions.ensure(user_id).await?;
        let limits = PlanLimits::for_tier(record.plan);

        let outcome = self
            .subscriptions
            .try_add_storage(user_id, requested_mb, limits.max_storage_mb)
            .await?;

        let allowed = outcome.is_granted();
        record_quota_check(QuotaDimension::Storage.as_str(), allowed);

        Ok(StorageDecision {
            allowed,
            used_mb: outcome.used_mb(),
            limit_mb: limits.max_storage_mb,
            requested_mb,
        })
    }

    fn validated_mb(&self, bytes: u64) -> ApiResult<u64> {
        if bytes > MAX_SINGLE_UPLOAD_BYTES {
            return Err(ApiError::bad_request(format!(
                "Requested size exceeds the {} MB single-upload maximum",
                MAX_SINGLE_UPLOAD_BYTES / (1024 * 1024)
            )));
        }
        Ok(mb_for_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use keepsake_models::{PlanLimits, PlanTier};

    #[test]
    fn test_free_plan_storage_window() {
        let limits = PlanLimits::for_tier(PlanTier::Free);
        assert!(limits.storage_fits(0, 500));
        assert!(!limits.storage_fits(0, 501));
        assert!(!limits.storage_fits(500, 1));
    }

    #[test]
    fn test_free_plan_single_story() {
        let limits = PlanLimits::for_tier(PlanTier::Free);
        assert!(limits.allows_story(0));
        assert!(!limits.allows_story(1));
        assert!(!limits.recipients_enabled);
    }
}
