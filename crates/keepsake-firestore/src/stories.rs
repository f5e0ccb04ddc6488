//! Story repository.
//!
//! Stories live in a per-user subcollection at `users/{user_id}/stories`.
//! Story-recipient links live in a root collection keyed by a deterministic
//! `{story_id}_{recipient_id}` id so link replacement stays idempotent.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use keepsake_models::{MediaKind, Story, StoryRecipient};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{
    Document, FromFirestoreValue, StructuredQuery, ToFirestoreValue, Value, Write,
};

/// Root collection for story-recipient link documents.
const STORY_RECIPIENTS_COLLECTION: &str = "story_recipients";

/// Which stories a list call should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryScope {
    /// Everything the user owns.
    All,
    /// Stories whose release time has passed.
    Published,
    /// Stories still waiting for their release time.
    Scheduled,
}

/// Repository for a single user's stories.
pub struct StoryRepository {
    client: FirestoreClient,
    user_id: String,
}

impl StoryRepository {
    pub fn new(client: FirestoreClient, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
        }
    }

    fn collection(&self) -> String {
        format!("users/{}/stories", self.user_id)
    }

    /// Persist a new story.
    pub async fn create(&self, story: &Story) -> FirestoreResult<()> {
        let fields = story_to_fields(story);
        self.client
            .create_document(&self.collection(), &story.id, fields)
            .await?;
        info!(user_id = %self.user_id, story_id = %story.id, "Created story");
        Ok(())
    }

    /// Load a story by id.
    pub async fn get(&self, story_id: &str) -> FirestoreResult<Option<Story>> {
        let doc = self.client.get_document(&self.collection(), story_id).await?;
        match doc {
            Some(d) => Ok(Some(document_to_story(&d, &self.user_id)?)),
            None => Ok(None),
        }
    }

    /// Update mutable story fields.
    pub async fn update(&self, story: &Story) -> FirestoreResult<()> {
        let fields = story_to_fields(story);
        let mask: Vec<String> = fields.keys().cloned().collect();
        self.client
            .update_document(&self.collection(), &story.id, fields, Some(mask))
            .await?;
        debug!(user_id = %self.user_id, story_id = %story.id, "Updated story");
        Ok(())
    }

    /// Delete a story. Idempotent.
    pub async fn delete(&self, story_id: &str) -> FirestoreResult<()> {
        self.client.delete_document(&self.collection(), story_id).await
    }

    /// List the user's stories, newest first, filtered by scope.
    ///
    /// Scope filtering happens client-side: release_at is compared against
    /// "now", which Firestore queries cannot express without a server clock.
    pub async fn list(&self, scope: StoryScope) -> FirestoreResult<Vec<Story>> {
        let query = StructuredQuery::collection("stories").order_by_desc("created_at");
        let parent = format!("users/{}", self.user_id);
        let docs = self.client.run_query(&parent, query).await?;

        let now = Utc::now();
        let mut stories = Vec::with_capacity(docs.len());
        for doc in &docs {
            let story = document_to_story(doc, &self.user_id)?;
            let keep = match scope {
                StoryScope::All => true,
                StoryScope::Published => !story.is_scheduled(now),
                StoryScope::Scheduled => story.is_scheduled(now),
            };
            if keep {
                stories.push(story);
            }
        }
        Ok(stories)
    }

    /// Total number of stories the user owns.
    pub async fn count(&self) -> FirestoreResult<u32> {
        Ok(self.list(StoryScope::All).await?.len() as u32)
    }

    /// Number of stories carrying video media.
    pub async fn video_count(&self) -> FirestoreResult<u32> {
        let stories = self.list(StoryScope::All).await?;
        Ok(stories.iter().filter(|s| s.is_video()).count() as u32)
    }
}

/// Repository for story-recipient links.
pub struct StoryLinkRepository {
    client: FirestoreClient,
    user_id: String,
}

impl StoryLinkRepository {
    pub fn new(client: FirestoreClient, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
        }
    }

    /// Replace the full recipient set of a story in one atomic batch:
    /// stale links are deleted and the new set upserted together.
    pub async fn replace_links(
        &self,
        story_id: &str,
        recipient_ids: &[String],
        notify: bool,
    ) -> FirestoreResult<()> {
        let existing = self.links_for_story(story_id).await?;

        let mut writes = Vec::new();

        for link in &existing {
            if !recipient_ids.contains(&link.recipient_id) {
                let name = self.client.full_document_name(
                    STORY_RECIPIENTS_COLLECTION,
                    &StoryRecipient::link_id(story_id, &link.recipient_id),
                );
                writes.push(Write::delete(name));
            }
        }

        for recipient_id in recipient_ids {
            let link = StoryRecipient::new(story_id, recipient_id, &self.user_id, notify);
            let name = self.client.full_document_name(
                STORY_RECIPIENTS_COLLECTION,
                &StoryRecipient::link_id(story_id, recipient_id),
            );
            writes.push(Write::upsert(name, link_to_fields(&link)));
        }

        self.client.batch_write(writes).await?;
        info!(
            user_id = %self.user_id,
            story_id = %story_id,
            recipients = recipient_ids.len(),
            "Replaced story recipient links"
        );
        Ok(())
    }

    /// All links attached to a story.
    pub async fn links_for_story(&self, story_id: &str) -> FirestoreResult<Vec<StoryRecipient>> {
        let query = StructuredQuery::collection(STORY_RECIPIENTS_COLLECTION)
            .where_eq("story_id", story_id.to_firestore_value())
            .where_eq("user_id", self.user_id.as_str().to_firestore_value());

        let docs = self.client.run_query("", query).await?;
        docs.iter().map(document_to_link).collect()
    }

    /// Delete every link attached to a story (story deletion cleanup).
    pub async fn delete_links_for_story(&self, story_id: &str) -> FirestoreResult<()> {
        let existing = self.links_for_story(story_id).await?;
        let writes: Vec<Write> = existing
            .iter()
            .map(|link| {
                Write::delete(self.client.full_document_name(
                    STORY_RECIPIENTS_COLLECTION,
                    &StoryRecipient::link_id(story_id, &link.recipient_id),
                ))
            })
            .collect();
        self.client.batch_write(writes).await?;
        Ok(())
    }

    /// Delete every link pointing at a recipient (recipient deletion cleanup).
    pub async fn delete_links_for_recipient(&self, recipient_id: &str) -> FirestoreResult<()> {
        let query = StructuredQuery::collection(STORY_RECIPIENTS_COLLECTION)
            .where_eq("recipient_id", recipient_id.to_firestore_value())
            .where_eq("user_id", self.user_id.as_str().to_firestore_value());

        let docs = self.client.run_query("", query).await?;
        let writes: Vec<Write> = docs
            .iter()
            .filter_map(|d| d.name.clone())
            .map(Write::delete)
            .collect();
        self.client.batch_write(writes).await?;
        Ok(())
    }
}

// ============================================================================
// Field Mapping
// ============================================================================

fn story_to_fields(story: &Story) -> HashMap<String, Value> {
    let mut fields = HashMap::new();

    fields.insert("title".to_string(), story.title.to_firestore_value());
    fields.insert(
        "description".to_string(),
        story.description.to_firestore_value(),
    );
    fields.insert(
        "media_url".to_string(),
        story.media_url.to_firestore_value(),
    );
    fields.insert(
        "media_kind".to_string(),
        story
            .media_kind
            .map(|k| k.as_str().to_string())
            .to_firestore_value(),
    );
    fields.insert(
        "created_at".to_string(),
        story.created_at.to_firestore_value(),
    );
    fields.insert(
        "release_at".to_string(),
        story.release_at.to_firestore_value(),
    );

    fields
}

fn document_to_story(doc: &Document, user_id: &str) -> FirestoreResult<Story> {
    let fields = doc
        .fields
        .as_ref()
        .ok_or_else(|| FirestoreError::InvalidResponse("Document has no fields".to_string()))?;

    let get_string = |key: &str| -> Option<String> {
        fields.get(key).and_then(String::from_firestore_value)
    };
    let get_time = |key: &str| -> Option<DateTime<Utc>> {
        fields.get(key).and_then(DateTime::from_firestore_value)
    };

    let id = doc.doc_id().map(str::to_string).ok_or_else(|| {
        FirestoreError::InvalidResponse("Story document has no resource name".to_string())
    })?;

    let created_at = get_time("created_at").unwrap_or_else(Utc::now);

    Ok(Story {
        id,
        user_id: user_id.to_string(),
        title: get_string("title").unwrap_or_default(),
        description: get_string("description"),
        media_url: get_string("media_url"),
        media_kind: get_string("media_kind").and_then(|s| MediaKind::parse(&s)),
        created_at,
        release_at: get_time("release_at").unwrap_or(created_at),
    })
}

fn link_to_fields(link: &StoryRecipient) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("story_id".to_string(), link.story_id.to_firestore_value());
    fields.insert(
        "recipient_id".to_string(),
        link.recipient_id.to_firestore_value(),
    );
    fields.insert("user_id".to_string(), link.user_id.to_firestore_value());
    fields.insert("notify".to_string(), link.notify.to_firestore_value());
    fields.insert("added_at".to_string(), link.added_at.to_firestore_value());
    fields
}

fn document_to_link(doc: &Document) -> FirestoreResult<StoryRecipient> {
    let fields = doc
        .fields
        .as_ref()
        .ok_or_else(|| FirestoreError::InvalidResponse("Document has no fields".to_string()))?;

    let get_string = |key: &str| -> Option<String> {
        fields.get(key).and_then(String::from_firestore_value)
    };

    Ok(StoryRecipient {
        story_id: get_string("story_id").unwrap_or_default(),
        recipient_id: get_string("recipient_id").unwrap_or_default(),
        user_id: get_string("user_id").unwrap_or_default(),
        notify: fields
            .get("notify")
            .and_then(bool::from_firestore_value)
            .unwrap_or(true),
        added_at: fields
            .get("added_at")
            .and_then(DateTime::from_firestore_value)
            .unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story_doc(fields: HashMap<String, Value>, id: &str) -> Document {
        Document {
            name: Some(format!(
                "projects/p/databases/(default)/documents/users/u1/stories/{}",
                id
            )),
            fields: Some(fields),
            create_time: None,
            update_time: None,
        }
    }

    #[test]
    fn test_story_round_trip() {
        let story = Story::new(
            "u1",
            "First steps",
            Some("A memory".to_string()),
            Some("https://cdn.example.com/clip.mp4".to_string()),
            None,
        );
        let fields = story_to_fields(&story);
        let parsed = document_to_story(&story_doc(fields, &story.id), "u1").unwrap();

        assert_eq!(parsed.id, story.id);
        assert_eq!(parsed.title, "First steps");
        assert_eq!(parsed.media_kind, Some(MediaKind::Video));
        assert!(parsed.is_video());
    }

    #[test]
    fn test_legacy_story_without_media_kind() {
        let story = Story::new("u1", "t", None, Some("https://x/a.webm".to_string()), None);
        let mut fields = story_to_fields(&story);
        fields.remove("media_kind");
        let parsed = document_to_story(&story_doc(fields, &story.id), "u1").unwrap();

        assert_eq!(parsed.media_kind, None);
        // Heuristic fallback still classifies it.
        assert!(parsed.is_video());
    }

    #[test]
    fn test_link_round_trip() {
        let link = StoryRecipient::new("s1", "r1", "u1", false);
        let doc = Document {
            name: Some(
                "projects/p/databases/(default)/documents/story_recipients/s1_r1".to_string(),
            ),
            fields: Some(link_to_fields(&link)),
            create_time: None,
            update_time: None,
        };
        let parsed = document_to_link(&doc).unwrap();
        assert_eq!(parsed.story_id, "s1");
        assert_eq!(parsed.recipient_id, "r1");
        assert!(!parsed.notify);
    }
}
