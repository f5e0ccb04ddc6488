//! Recipient repository.
//!
//! Recipients live in a per-user subcollection at `users/{user_id}/recipients`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use keepsake_models::Recipient;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, FromFirestoreValue, StructuredQuery, ToFirestoreValue, Value};

pub struct RecipientRepository {
    client: FirestoreClient,
    user_id: String,
}

impl RecipientRepository {
    pub fn new(client: FirestoreClient, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
        }
    }

    fn collection(&self) -> String {
        format!("users/{}/recipients", self.user_id)
    }

    pub async fn create(&self, recipient: &Recipient) -> FirestoreResult<()> {
        let fields = recipient_to_fields(recipient);
        self.client
            .create_document(&self.collection(), &recipient.id, fields)
            .await?;
        info!(user_id = %self.user_id, recipient_id = %recipient.id, "Created recipient");
        Ok(())
    }

    pub async fn get(&self, recipient_id: &str) -> FirestoreResult<Option<Recipient>> {
        let doc = self
            .client
            .get_document(&self.collection(), recipient_id)
            .await?;
        match doc {
            Some(d) => Ok(Some(document_to_recipient(&d, &self.user_id)?)),
            None => Ok(None),
        }
    }

    pub async fn update(&self, recipient: &Recipient) -> FirestoreResult<()> {
        let fields = recipient_to_fields(recipient);
        let mask: Vec<String> = fields.keys().cloned().collect();
        self.client
            .update_document(&self.collection(), &recipient.id, fields, Some(mask))
            .await?;
        debug!(user_id = %self.user_id, recipient_id = %recipient.id, "Updated recipient");
        Ok(())
    }

    /// Delete a recipient. Idempotent.
    pub async fn delete(&self, recipient_id: &str) -> FirestoreResult<()> {
        self.client
            .delete_document(&self.collection(), recipient_id)
            .await
    }

    /// List the user's recipients, newest first.
    pub async fn list(&self) -> FirestoreResult<Vec<Recipient>> {
        let query = StructuredQuery::collection("recipients").order_by_desc("created_at");
        let parent = format!("users/{}", self.user_id);
        let docs = self.client.run_query(&parent, query).await?;

        docs.iter()
            .map(|d| document_to_recipient(d, &self.user_id))
            .collect()
    }
}

// ============================================================================
// Field Mapping
// ============================================================================

fn recipient_to_fields(recipient: &Recipient) -> HashMap<String, Value> {
    let mut fields = HashMap::new();

    fields.insert("name".to_string(), recipient.name.to_firestore_value());
    fields.insert("email".to_string(), recipient.email.to_firestore_value());
    fields.insert(
        "first_name".to_string(),
        recipient.first_name.to_firestore_value(),
    );
    fields.insert(
        "last_name".to_string(),
        recipient.last_name.to_firestore_value(),
    );
    fields.insert(
        "relationship".to_string(),
        recipient.relationship.to_firestore_value(),
    );
    fields.insert("phone".to_string(), recipient.phone.to_firestore_value());
    fields.insert("notes".to_string(), recipient.notes.to_firestore_value());
    fields.insert(
        "avatar_url".to_string(),
        recipient.avatar_url.to_firestore_value(),
    );
    fields.insert(
        "created_at".to_string(),
        recipient.created_at.to_firestore_value(),
    );

    fields
}

fn document_to_recipient(doc: &Document, user_id: &str) -> FirestoreResult<Recipient> {
    let fields = doc
        .fields
        .as_ref()
        .ok_or_else(|| FirestoreError::InvalidResponse("Document has no fields".to_string()))?;

    let get_string = |key: &str| -> Option<String> {
        fields.get(key).and_then(String::from_firestore_value)
    };

    let id = doc.doc_id().map(str::to_string).ok_or_else(|| {
        FirestoreError::InvalidResponse("Recipient document has no resource name".to_string())
    })?;

    Ok(Recipient {
        id,
        user_id: user_id.to_string(),
        name: get_string("name").unwrap_or_default(),
        email: get_string("email").unwrap_or_default(),
        first_name: get_string("first_name"),
        last_name: get_string("last_name"),
        relationship: get_string("relationship"),
        phone: get_string("phone"),
        notes: get_string("notes"),
        avatar_url: get_string("avatar_url"),
        created_at: fields
            .get("created_at")
            .and_then(DateTime::from_firestore_value)
            .unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_round_trip() {
        let mut recipient = Recipient::new("u1", "Grandma June", "june@example.com");
        recipient.relationship = Some("grandmother".to_string());

        let doc = Document {
            name: Some(format!(
                "projects/p/databases/(default)/documents/users/u1/recipients/{}",
                recipient.id
            )),
            fields: Some(recipient_to_fields(&recipient)),
            create_time: None,
            update_time: None,
        };

        let parsed = document_to_recipient(&doc, "u1").unwrap();
        assert_eq!(parsed.id, recipient.id);
        assert_eq!(parsed.email, "june@example.com");
        assert_eq!(parsed.relationship.as_deref(), Some("grandmother"));
        assert!(parsed.phone.is_none());
    }
}
