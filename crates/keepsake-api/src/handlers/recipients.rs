//! Recipient API handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::ValidateEmail;

use keepsake_firestore::{RecipientRepository, StoryLinkRepository};
use keepsake_models::Recipient;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn recipients(state: &AppState, uid: &str) -> RecipientRepository {
    RecipientRepository::new((*state.firestore).clone(), uid)
}

#[derive(Serialize)]
pub struct RecipientResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub created_at: String,
}

impl RecipientResponse {
    fn from_recipient(r: Recipient) -> Self {
        Self {
            id: r.id,
            name: r.name,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            relationship: r.relationship,
            phone: r.phone,
            notes: r.notes,
            avatar_url: r.avatar_url,
            created_at: r.created_at.to_rfc3339(),
        }
    }
}

/// Create recipient request.
#[derive(Deserialize)]
pub struct CreateRecipientRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Create a recipient (plan-gated).
pub async fn create_recipient(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateRecipientRequest>,
) -> ApiResult<Json<RecipientResponse>> {
    state.entitlements.authorize_recipients(&user.uid).await?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }
    let email = req.email.trim();
    if !email.validate_email() {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }

    let mut recipient = Recipient::new(&user.uid, name, email);
    recipient.first_name = req.first_name;
    recipient.last_name = req.last_name;
    recipient.relationship = req.relationship;
    recipient.phone = req.phone;
    recipient.notes = req.notes;
    recipient.avatar_url = req.avatar_url;

    recipients(&state, &user.uid).create(&recipient).await?;

    Ok(Json(RecipientResponse::from_recipient(recipient)))
}

#[derive(Serialize)]
pub struct RecipientsResponse {
    pub recipients: Vec<RecipientResponse>,
}

/// List the caller's recipients, newest first.
pub async fn list_recipients(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<RecipientsResponse>> {
    state.entitlements.authorize_recipients(&user.uid).await?;

    let items = recipients(&state, &user.uid).list().await?;
    Ok(Json(RecipientsResponse {
        recipients: items
            .into_iter()
            .map(RecipientResponse::from_recipient)
            .collect(),
    }))
}

/// Get a single recipient.
pub async fn get_recipient(
    State(state): State<AppState>,
    Path(recipient_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<RecipientResponse>> {
    state.entitlements.authorize_recipients(&user.uid).await?;

    let recipient = recipients(&state, &user.uid)
        .get(&recipient_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Recipient not found"))?;
    Ok(Json(RecipientResponse::from_recipient(recipient)))
}

/// Update recipient request. Absent fields are left unchanged.
#[derive(Deserialize)]
pub struct UpdateRecipientRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Update a recipient's details.
pub async fn update_recipient(
    State(state): State<AppState>,
    Path(recipient_id): Path<String>,
    user: AuthUser,
    Json(req): Json<UpdateRecipientRequest>,
) -> ApiResult<Json<RecipientResponse>> {
    state.entitlements.authorize_recipients(&user.uid).await?;

    let repo = recipients(&state, &user.uid);
    let mut recipient = repo
        .get(&recipient_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Recipient not found"))?;

    if let Some(name) = req.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::bad_request("Name is required"));
        }
        recipient.name = name;
    }
    if let Some(email) = req.email {
        let email = email.trim().to_string();
        if !email.validate_email() {
            return Err(ApiError::Validation("Invalid email address".to_string()));
        }
        recipient.email = email;
    }
    if req.first_name.is_some() {
        recipient.first_name = req.first_name;
    }
    if req.last_name.is_some() {
        recipient.last_name = req.last_name;
    }
    if req.relationship.is_some() {
        recipient.relationship = req.relationship;
    }
    if req.phone.is_some() {
        recipient.phone = req.phone;
    }
    if req.notes.is_some() {
        recipient.notes = req.notes;
    }
    if req.avatar_url.is_some() {
        recipient.avatar_url = req.avatar_url;
    }

    repo.update(&recipient).await?;
    Ok(Json(RecipientResponse::from_recipient(recipient)))
}

/// Delete a recipient and every story link pointing at it.
pub async fn delete_recipient(
    State(state): State<AppState>,
    Path(recipient_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    state.entitlements.authorize_recipients(&user.uid).await?;

    let repo = recipients(&state, &user.uid);
    if repo.get(&recipient_id).await?.is_none() {
        return Err(ApiError::not_found("Recipient not found"));
    }

    StoryLinkRepository::new((*state.firestore).clone(), &user.uid)
        .delete_links_for_recipient(&recipient_id)
        .await?;
    repo.delete(&recipient_id).await?;

    info!(user_id = %user.uid, recipient_id = %recipient_id, "Deleted recipient");
    Ok(Json(serde_json::json!({ "deleted": true })))
}
