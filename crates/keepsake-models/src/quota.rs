//! Quota dimensions and pure quota arithmetic.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::plan::{PlanLimits, PlanTier};

/// Bytes in one megabyte, the unit the storage counter is kept in.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// An independently tracked and limited resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum QuotaDimension {
    Stories,
    Videos,
    Storage,
}

impl QuotaDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaDimension::Stories => "stories",
            QuotaDimension::Videos => "videos",
            QuotaDimension::Storage => "storage",
        }
    }

    /// User-facing message shown when this dimension's ceiling is hit.
    pub fn limit_message(&self) -> &'static str {
        match self {
            QuotaDimension::Stories => "Story limit reached for your plan",
            QuotaDimension::Videos => "Video limit reached for your plan",
            QuotaDimension::Storage => "Storage limit reached",
        }
    }
}

impl std::fmt::Display for QuotaDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Megabytes charged for an upload of `bytes`, rounding up.
///
/// A single byte charges a full megabyte; exactly 1 MiB charges one.
pub fn mb_for_bytes(bytes: u64) -> u64 {
    bytes.div_ceil(BYTES_PER_MB)
}

/// Aggregate usage snapshot surfaced to the UI.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UsageSnapshot {
    /// Current plan tier.
    pub plan: PlanTier,
    /// Billing status as mirrored from the payment provider.
    pub status: String,
    /// Number of stories the user owns.
    pub story_count: u32,
    /// Number of those stories classified as video.
    pub video_count: u32,
    /// Storage consumed so far, in megabytes.
    pub storage_used_mb: u64,
    /// The plan's limits, for rendering usage meters.
    pub limits: PlanLimits,
    /// End of the current billing period, if subscribed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mb_for_bytes_rounds_up() {
        assert_eq!(mb_for_bytes(0), 0);
        assert_eq!(mb_for_bytes(1), 1);
        assert_eq!(mb_for_bytes(BYTES_PER_MB), 1);
        assert_eq!(mb_for_bytes(BYTES_PER_MB + 1), 2);
        assert_eq!(mb_for_bytes(500 * BYTES_PER_MB), 500);
        assert_eq!(mb_for_bytes(500 * BYTES_PER_MB + 1), 501);
    }

    #[test]
    fn test_storage_boundary_at_free_ceiling() {
        // 500 MiB exactly fills the free tier; one more byte tips over.
        let free = PlanLimits::for_tier(PlanTier::Free);
        assert!(free.storage_fits(0, mb_for_bytes(500 * BYTES_PER_MB)));
        assert!(!free.storage_fits(0, mb_for_bytes(500 * BYTES_PER_MB + 1)));
    }

    #[test]
    fn test_dimension_strings() {
        assert_eq!(QuotaDimension::Stories.as_str(), "stories");
        assert_eq!(QuotaDimension::Videos.as_str(), "videos");
        assert_eq!(QuotaDimension::Storage.as_str(), "storage");
    }
}
