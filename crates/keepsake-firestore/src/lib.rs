//! Firestore persistence for Keepsake.
//!
//! A thin REST client plus one repository per collection. All repositories
//! share the same [`FirestoreClient`], which handles auth token caching,
//! retries, and request metrics.

pub mod client;
pub mod coupons;
pub mod error;
pub mod metrics;
pub mod recipients;
pub mod retry;
pub mod stories;
pub mod subscriptions;
pub mod token_cache;
pub mod types;
pub mod webhook_events;

pub use client::{FirestoreClient, FirestoreConfig};
pub use coupons::CouponRepository;
pub use error::{FirestoreError, FirestoreResult};
pub use recipients::RecipientRepository;
pub use retry::RetryConfig;
pub use stories::{StoryLinkRepository, StoryRepository, StoryScope};
pub use subscriptions::{StorageOutcome, SubscriptionRepository};
pub use webhook_events::WebhookEventRepository;
