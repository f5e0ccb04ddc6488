//! Media kind classification for story attachments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What a story's media URL points at.
///
/// Stored on the story at creation time so quota counting does not depend on
/// re-running the URL heuristic forever; [`MediaKind::classify`] remains the
/// fallback for rows written before the kind was persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a media URL by extension or path content.
    ///
    /// `.webm` and `.mp4` extensions, or any URL containing the substring
    /// `video`, count as video. This is a heuristic, not ground truth: a
    /// filename that happens to contain "video" misclassifies. New stories
    /// carry a stored kind for exactly that reason.
    pub fn classify(url: &str) -> MediaKind {
        let lower = url.to_lowercase();
        if lower.ends_with(".webm") || lower.ends_with(".mp4") || lower.contains("video") {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    /// Parse a stored kind string; `None` for unknown values.
    pub fn parse(s: &str) -> Option<MediaKind> {
        match s {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, MediaKind::Video)
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_video_extensions() {
        assert_eq!(MediaKind::classify("https://cdn.example/a.webm"), MediaKind::Video);
        assert_eq!(MediaKind::classify("https://cdn.example/a.mp4"), MediaKind::Video);
        assert_eq!(MediaKind::classify("https://cdn.example/A.MP4"), MediaKind::Video);
    }

    #[test]
    fn test_classify_video_substring() {
        assert_eq!(
            MediaKind::classify("https://cdn.example/video/abc.jpg"),
            MediaKind::Video
        );
    }

    #[test]
    fn test_classify_images() {
        assert_eq!(MediaKind::classify("https://cdn.example/a.jpg"), MediaKind::Image);
        assert_eq!(MediaKind::classify("https://cdn.example/a.png"), MediaKind::Image);
    }

    #[test]
    fn test_parse_round_trip() {
        assert_eq!(MediaKind::parse("image"), Some(MediaKind::Image));
        assert_eq!(MediaKind::parse("video"), Some(MediaKind::Video));
        assert_eq!(MediaKind::parse("audio"), None);
    }
}
