//! Story model.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::media::MediaKind;

/// A story owned by exactly one user.
///
/// A story whose `release_at` lies in the future is "scheduled"; otherwise it
/// is "published". There is no separate status field.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Story {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub media_url: Option<String>,
    /// Stored media classification, set at creation from the URL heuristic.
    /// Absent on rows written before the kind was persisted.
    pub media_kind: Option<MediaKind>,
    pub created_at: DateTime<Utc>,
    pub release_at: DateTime<Utc>,
}

impl Story {
    /// Build a new story, deriving the stored media kind from the URL.
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        description: Option<String>,
        media_url: Option<String>,
        release_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        let media_kind = media_url.as_deref().map(MediaKind::classify);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: title.into(),
            description,
            media_url,
            media_kind,
            created_at: now,
            release_at: release_at.unwrap_or(now),
        }
    }

    /// Effective media kind: the stored value when present, the URL heuristic
    /// for legacy rows, `None` when there is no media at all.
    pub fn effective_media_kind(&self) -> Option<MediaKind> {
        self.media_kind
            .or_else(|| self.media_url.as_deref().map(MediaKind::classify))
    }

    /// Whether this story counts against the video quota.
    pub fn is_video(&self) -> bool {
        self.effective_media_kind().is_some_and(|k| k.is_video())
    }

    /// Whether the story is still scheduled for a future release.
    pub fn is_scheduled(&self, now: DateTime<Utc>) -> bool {
        self.release_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_story_derives_media_kind() {
        let story = Story::new("u1", "t", None, Some("https://x/a.mp4".into()), None);
        assert_eq!(story.media_kind, Some(MediaKind::Video));
        assert!(story.is_video());

        let story = Story::new("u1", "t", None, Some("https://x/a.png".into()), None);
        assert_eq!(story.media_kind, Some(MediaKind::Image));
        assert!(!story.is_video());
    }

    #[test]
    fn test_no_media_is_not_video() {
        let story = Story::new("u1", "t", None, None, None);
        assert_eq!(story.effective_media_kind(), None);
        assert!(!story.is_video());
    }

    #[test]
    fn test_legacy_row_falls_back_to_heuristic() {
        let mut story = Story::new("u1", "t", None, Some("https://x/clip.webm".into()), None);
        story.media_kind = None;
        assert_eq!(story.effective_media_kind(), Some(MediaKind::Video));
    }

    #[test]
    fn test_scheduled_vs_published() {
        let now = Utc::now();
        let story = Story::new("u1", "t", None, None, Some(now + Duration::hours(1)));
        assert!(story.is_scheduled(now));

        let story = Story::new("u1", "t", None, None, Some(now - Duration::hours(1)));
        assert!(!story.is_scheduled(now));
    }
}
