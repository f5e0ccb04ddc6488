//! Story API handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use keepsake_firestore::{RecipientRepository, StoryLinkRepository, StoryRepository, StoryScope};
use keepsake_models::{MediaKind, Story};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn stories(state: &AppState, uid: &str) -> StoryRepository {
    StoryRepository::new((*state.firestore).clone(), uid)
}

fn links(state: &AppState, uid: &str) -> StoryLinkRepository {
    StoryLinkRepository::new((*state.firestore).clone(), uid)
}

/// Story response shape shared by every story endpoint.
#[derive(Serialize)]
pub struct StoryResponse {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_kind: Option<String>,
    pub scheduled: bool,
    pub created_at: String,
    pub release_at: String,
}

impl StoryResponse {
    fn from_story(story: Story) -> Self {
        let scheduled = story.is_scheduled(Utc::now());
        Self {
            id: story.id,
            title: story.title,
            description: story.description,
            media_url: story.media_url,
            media_kind: story.media_kind.map(|k| k.as_str().to_string()),
            scheduled,
            created_at: story.created_at.to_rfc3339(),
            release_at: story.release_at.to_rfc3339(),
        }
    }
}

/// Create story request.
#[derive(Deserialize)]
pub struct CreateStoryRequest {
    /// Optional at the wire level so a missing title is a 400, not a 422.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub release_at: Option<DateTime<Utc>>,
    /// Recipients to share with immediately; requires a recipient-enabled plan.
    #[serde(default)]
    pub recipient_ids: Option<Vec<String>>,
    #[serde(default = "default_notify")]
    pub notify: bool,
}

/// A missing, empty, or whitespace-only title is rejected as a bad request.
fn require_title(title: Option<&str>) -> ApiResult<&str> {
    match title.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(ApiError::bad_request("Missing story title")),
    }
}

/// Create a story, enforcing the plan's story and video ceilings.
pub async fn create_story(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateStoryRequest>,
) -> ApiResult<Json<StoryResponse>> {
    let title = require_title(req.title.as_deref())?;

    let is_video = req
        .media_url
        .as_deref()
        .map(MediaKind::classify)
        .is_some_and(|k| k.is_video());

    state
        .entitlements
        .authorize_story_creation(&user.uid, is_video)
        .await?;

    let recipient_ids = req.recipient_ids.unwrap_or_default();
    if !recipient_ids.is_empty() {
        state.entitlements.authorize_recipients(&user.uid).await?;
    }

    let story = Story::new(
        &user.uid,
        title,
        req.description,
        req.media_url,
        req.release_at,
    );
    stories(&state, &user.uid).create(&story).await?;

    if !recipient_ids.is_empty() {
        links(&state, &user.uid)
            .replace_links(&story.id, &recipient_ids, req.notify)
            .await?;
    }

    Ok(Json(StoryResponse::from_story(story)))
}

/// Story list query parameters.
#[derive(Deserialize)]
pub struct ListStoriesQuery {
    /// One of `all`, `published`, `scheduled`. Defaults to `all`.
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Serialize)]
pub struct StoriesResponse {
    pub stories: Vec<StoryResponse>,
}

/// List the caller's stories, newest first.
pub async fn list_stories(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListStoriesQuery>,
) -> ApiResult<Json<StoriesResponse>> {
    let scope = match query.scope.as_deref() {
        None | Some("all") => StoryScope::All,
        Some("published") => StoryScope::Published,
        Some("scheduled") => StoryScope::Scheduled,
        Some(other) => {
            return Err(ApiError::bad_request(format!("Unknown scope: {}", other)));
        }
    };

    let items = stories(&state, &user.uid).list(scope).await?;
    Ok(Json(StoriesResponse {
        stories: items.into_iter().map(StoryResponse::from_story).collect(),
    }))
}

/// Get a single story.
pub async fn get_story(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<StoryResponse>> {
    let story = stories(&state, &user.uid)
        .get(&story_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Story not found"))?;
    Ok(Json(StoryResponse::from_story(story)))
}

/// Update story request. Absent fields are left unchanged; `media_url`
/// uses double-option semantics so it can be explicitly cleared.
#[derive(Deserialize)]
pub struct UpdateStoryRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub media_url: Option<Option<String>>,
    #[serde(default)]
    pub release_at: Option<DateTime<Utc>>,
}

/// Distinguishes an absent field (outer None) from an explicit null
/// (Some(None)), which clears the stored value.
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(de).map(Some)
}

/// Update a story's editable fields.
pub async fn update_story(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    user: AuthUser,
    Json(req): Json<UpdateStoryRequest>,
) -> ApiResult<Json<StoryResponse>> {
    let repo = stories(&state, &user.uid);
    let mut story = repo
        .get(&story_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Story not found"))?;

    if let Some(title) = req.title {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(ApiError::bad_request("Missing story title"));
        }
        story.title = title;
    }
    if let Some(description) = req.description {
        story.description = description;
    }
    if let Some(media_url) = req.media_url {
        let was_video = story.is_video();
        story.media_kind = media_url.as_deref().map(MediaKind::classify);
        story.media_url = media_url;
        // Swapping image media for video still has to pass the video ceiling.
        if story.is_video() && !was_video {
            state
                .entitlements
                .authorize_story_creation(&user.uid, true)
                .await?;
        }
    }
    if let Some(release_at) = req.release_at {
        story.release_at = release_at;
    }

    repo.update(&story).await?;
    Ok(Json(StoryResponse::from_story(story)))
}

/// Delete a story and its recipient links.
pub async fn delete_story(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let repo = stories(&state, &user.uid);
    if repo.get(&story_id).await?.is_none() {
        return Err(ApiError::not_found("Story not found"));
    }

    links(&state, &user.uid).delete_links_for_story(&story_id).await?;
    repo.delete(&story_id).await?;

    info!(user_id = %user.uid, story_id = %story_id, "Deleted story");
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Serialize)]
pub struct StoryLinkResponse {
    pub recipient_id: String,
    pub notify: bool,
    pub added_at: String,
    /// Enriched from the recipient document; absent when the lookup fails
    /// or the recipient was deleted out from under the link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Serialize)]
pub struct StoryRecipientsResponse {
    pub story_id: String,
    pub recipients: Vec<StoryLinkResponse>,
}

/// List the recipients a story is shared with.
pub async fn get_story_recipients(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<StoryRecipientsResponse>> {
    state.entitlements.authorize_recipients(&user.uid).await?;

    if stories(&state, &user.uid).get(&story_id).await?.is_none() {
        return Err(ApiError::not_found("Story not found"));
    }

    let items = links(&state, &user.uid).links_for_story(&story_id).await?;
    let recipient_repo = RecipientRepository::new((*state.firestore).clone(), &user.uid);

    let mut recipients = Vec::with_capacity(items.len());
    for link in items {
        // Best effort: a failed lookup degrades the entry, not the request.
        let recipient = recipient_repo
            .get(&link.recipient_id)
            .await
            .ok()
            .flatten();
        recipients.push(StoryLinkResponse {
            recipient_id: link.recipient_id,
            notify: link.notify,
            added_at: link.added_at.to_rfc3339(),
            name: recipient.as_ref().map(|r| r.name.clone()),
            email: recipient.map(|r| r.email),
        });
    }

    Ok(Json(StoryRecipientsResponse {
        story_id,
        recipients,
    }))
}

/// Set story recipients request.
#[derive(Deserialize)]
pub struct SetStoryRecipientsRequest {
    pub recipient_ids: Vec<String>,
    #[serde(default = "default_notify")]
    pub notify: bool,
}

fn default_notify() -> bool {
    true
}

/// Replace the full set of recipients a story is shared with.
pub async fn set_story_recipients(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    user: AuthUser,
    Json(req): Json<SetStoryRecipientsRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state.entitlements.authorize_recipients(&user.uid).await?;

    if stories(&state, &user.uid).get(&story_id).await?.is_none() {
        return Err(ApiError::not_found("Story not found"));
    }

    links(&state, &user.uid)
        .replace_links(&story_id, &req.recipient_ids, req.notify)
        .await?;

    Ok(Json(serde_json::json!({
        "story_id": story_id,
        "recipient_count": req.recipient_ids.len(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_distinguishes_absent_from_null() {
        let req: UpdateStoryRequest = serde_json::from_str(r#"{"title": "t"}"#).unwrap();
        assert!(req.media_url.is_none());

        let req: UpdateStoryRequest = serde_json::from_str(r#"{"media_url": null}"#).unwrap();
        assert_eq!(req.media_url, Some(None));

        let req: UpdateStoryRequest =
            serde_json::from_str(r#"{"media_url": "https://x/a.mp4"}"#).unwrap();
        assert_eq!(req.media_url, Some(Some("https://x/a.mp4".to_string())));
    }

    #[test]
    fn test_create_request_defaults_notify() {
        let req: CreateStoryRequest = serde_json::from_str(r#"{"title": "t"}"#).unwrap();
        assert!(req.notify);
        assert!(req.recipient_ids.is_none());
    }

    #[test]
    fn test_create_request_accepts_missing_title() {
        // The wire shape tolerates an absent title so the handler can
        // answer with a 400 instead of a deserialization 422.
        let req: CreateStoryRequest = serde_json::from_str("{}").unwrap();
        assert!(req.title.is_none());
    }

    #[test]
    fn test_missing_title_is_a_bad_request() {
        for title in [None, Some(""), Some("   ")] {
            let err = require_title(title).unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)));
            assert_eq!(err.to_string(), "Missing story title");
        }

        assert_eq!(require_title(Some("  First steps  ")).unwrap(), "First steps");
    }
}
