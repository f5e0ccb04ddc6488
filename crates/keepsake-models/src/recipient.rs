//! Recipient model and story-recipient links.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A person a user's stories can be shared with.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Recipient {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub relationship: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Recipient {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            name: name.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            relationship: None,
            phone: None,
            notes: None,
            avatar_url: None,
            created_at: Utc::now(),
        }
    }
}

/// Many-to-many link between a story and a recipient.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoryRecipient {
    pub story_id: String,
    pub recipient_id: String,
    pub user_id: String,
    /// Whether the recipient should be notified on release.
    pub notify: bool,
    pub added_at: DateTime<Utc>,
}

impl StoryRecipient {
    pub fn new(
        story_id: impl Into<String>,
        recipient_id: impl Into<String>,
        user_id: impl Into<String>,
        notify: bool,
    ) -> Self {
        Self {
            story_id: story_id.into(),
            recipient_id: recipient_id.into(),
            user_id: user_id.into(),
            notify,
            added_at: Utc::now(),
        }
    }

    /// Deterministic link document id.
    pub fn link_id(story_id: &str, recipient_id: &str) -> String {
        format!("{}_{}", story_id, recipient_id)
    }
}

/// Discount coupon redeemable at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Coupon {
    pub code: String,
    pub active: bool,
    pub stripe_coupon_id: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_id_is_deterministic() {
        assert_eq!(StoryRecipient::link_id("s1", "r1"), "s1_r1");
    }
}
