//! Plan catalog: tiers and their usage limits.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Plan tier enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Premium,
}

impl PlanTier {
    /// Parse from string (case-insensitive). Unknown values fall back to Free.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pro" => PlanTier::Pro,
            "premium" => PlanTier::Premium,
            _ => PlanTier::Free,
        }
    }

    /// Get the plan name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Premium => "premium",
        }
    }

    /// All tiers in ascending order of value.
    pub fn all() -> [PlanTier; 3] {
        [PlanTier::Free, PlanTier::Pro, PlanTier::Premium]
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-tier usage limits.
///
/// Catalog entries are static; limits are non-decreasing from free to premium
/// (a catalog invariant checked in tests, not enforced at runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlanLimits {
    /// Plan identifier.
    pub plan_id: String,
    /// Maximum number of stories.
    pub max_stories: u32,
    /// Maximum number of video stories.
    pub max_videos: u32,
    /// Storage limit in megabytes.
    pub max_storage_mb: u64,
    /// Whether the recipients feature is unlocked.
    pub recipients_enabled: bool,
    /// Whether scheduled delivery is unlocked.
    pub delivery_enabled: bool,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            plan_id: "free".to_string(),
            max_stories: 1,
            max_videos: 1,
            max_storage_mb: 500,
            recipients_enabled: false,
            delivery_enabled: false,
        }
    }
}

impl PlanLimits {
    /// Look up the limits for a plan tier.
    pub fn for_tier(tier: PlanTier) -> Self {
        match tier {
            PlanTier::Free => Self::default(),
            PlanTier::Pro => Self {
                plan_id: "pro".to_string(),
                max_stories: 100,
                max_videos: 25,
                max_storage_mb: 5_120,
                recipients_enabled: true,
                delivery_enabled: true,
            },
            PlanTier::Premium => Self {
                plan_id: "premium".to_string(),
                max_stories: 10_000,
                max_videos: 2_000,
                max_storage_mb: 102_400,
                recipients_enabled: true,
                delivery_enabled: true,
            },
        }
    }

    /// Whether a user with `story_count` existing stories may create another.
    pub fn allows_story(&self, story_count: u32) -> bool {
        story_count < self.max_stories
    }

    /// Whether a user with `video_count` existing videos may upload another.
    pub fn allows_video(&self, video_count: u32) -> bool {
        video_count < self.max_videos
    }

    /// Whether `delta_mb` more megabytes fit under the storage ceiling.
    ///
    /// A request landing exactly at the ceiling is allowed.
    pub fn storage_fits(&self, used_mb: u64, delta_mb: u64) -> bool {
        used_mb.saturating_add(delta_mb) <= self.max_storage_mb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_tier_from_string() {
        assert_eq!(PlanTier::from_str("free"), PlanTier::Free);
        assert_eq!(PlanTier::from_str("pro"), PlanTier::Pro);
        assert_eq!(PlanTier::from_str("premium"), PlanTier::Premium);
        assert_eq!(PlanTier::from_str("PREMIUM"), PlanTier::Premium);
        assert_eq!(PlanTier::from_str("unknown"), PlanTier::Free);
    }

    #[test]
    fn test_every_tier_allows_at_least_one_story() {
        for tier in PlanTier::all() {
            assert!(PlanLimits::for_tier(tier).max_stories >= 1, "{tier}");
        }
    }

    #[test]
    fn test_limits_non_decreasing_across_tiers() {
        let tiers = PlanTier::all();
        for pair in tiers.windows(2) {
            let lower = PlanLimits::for_tier(pair[0]);
            let upper = PlanLimits::for_tier(pair[1]);
            assert!(lower.max_stories <= upper.max_stories);
            assert!(lower.max_videos <= upper.max_videos);
            assert!(lower.max_storage_mb <= upper.max_storage_mb);
            assert!(lower.recipients_enabled <= upper.recipients_enabled);
            assert!(lower.delivery_enabled <= upper.delivery_enabled);
        }
    }

    #[test]
    fn test_allows_story_at_limit() {
        let free = PlanLimits::for_tier(PlanTier::Free);
        assert!(free.allows_story(0));
        assert!(!free.allows_story(1));
        assert!(!free.allows_story(2));
    }

    #[test]
    fn test_storage_fits_exactly_at_ceiling() {
        let free = PlanLimits::for_tier(PlanTier::Free);
        assert!(free.storage_fits(0, 500));
        assert!(!free.storage_fits(0, 501));
        assert!(free.storage_fits(490, 10));
        assert!(!free.storage_fits(490, 11));
    }
}
