//! Coupon lookup.
//!
//! Coupons are stored at `coupons/{code}` with codes normalized to
//! uppercase, matching how they are redeemed at checkout.

use chrono::{DateTime, Utc};

use keepsake_models::Coupon;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, FromFirestoreValue};

const COUPONS_COLLECTION: &str = "coupons";

pub struct CouponRepository {
    client: FirestoreClient,
}

impl CouponRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Look up an active coupon by code. Inactive or unknown codes both
    /// return `None`; callers treat them identically.
    pub async fn get_active(&self, code: &str) -> FirestoreResult<Option<Coupon>> {
        let normalized = code.trim().to_uppercase();
        if normalized.is_empty() {
            return Ok(None);
        }

        let doc = self
            .client
            .get_document(COUPONS_COLLECTION, &normalized)
            .await?;

        match doc {
            Some(d) => {
                let coupon = document_to_coupon(&d)?;
                Ok(coupon.active.then_some(coupon))
            }
            None => Ok(None),
        }
    }
}

fn document_to_coupon(doc: &Document) -> FirestoreResult<Coupon> {
    let fields = doc
        .fields
        .as_ref()
        .ok_or_else(|| FirestoreError::InvalidResponse("Document has no fields".to_string()))?;

    let get_string = |key: &str| -> Option<String> {
        fields.get(key).and_then(String::from_firestore_value)
    };

    let code = doc.doc_id().map(str::to_string).ok_or_else(|| {
        FirestoreError::InvalidResponse("Coupon document has no resource name".to_string())
    })?;

    Ok(Coupon {
        code,
        active: fields
            .get("active")
            .and_then(bool::from_firestore_value)
            .unwrap_or(false),
        stripe_coupon_id: get_string("stripe_coupon_id"),
        description: get_string("description"),
        created_at: fields
            .get("created_at")
            .and_then(DateTime::from_firestore_value)
            .unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToFirestoreValue, Value};
    use std::collections::HashMap;

    fn coupon_doc(active: bool) -> Document {
        let mut fields: HashMap<String, Value> = HashMap::new();
        fields.insert("active".to_string(), active.to_firestore_value());
        fields.insert(
            "stripe_coupon_id".to_string(),
            "coupon_abc".to_firestore_value(),
        );
        Document {
            name: Some("projects/p/databases/(default)/documents/coupons/LAUNCH20".to_string()),
            fields: Some(fields),
            create_time: None,
            update_time: None,
        }
    }

    #[test]
    fn test_coupon_parses_from_document() {
        let coupon = document_to_coupon(&coupon_doc(true)).unwrap();
        assert_eq!(coupon.code, "LAUNCH20");
        assert!(coupon.active);
        assert_eq!(coupon.stripe_coupon_id.as_deref(), Some("coupon_abc"));
    }

    #[test]
    fn test_missing_active_flag_defaults_to_inactive() {
        let mut doc = coupon_doc(true);
        doc.fields.as_mut().unwrap().remove("active");
        let coupon = document_to_coupon(&doc).unwrap();
        assert!(!coupon.active);
    }
}
