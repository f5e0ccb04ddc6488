//! Shared data models for the Keepsake backend.
//!
//! Pure types and arithmetic only: plan catalog, subscription record, story
//! and recipient entities, media classification, quota math. No I/O.

pub mod media;
pub mod plan;
pub mod quota;
pub mod recipient;
pub mod story;
pub mod subscription;

pub use media::MediaKind;
pub use plan::{PlanLimits, PlanTier};
pub use quota::{mb_for_bytes, QuotaDimension, UsageSnapshot, BYTES_PER_MB};
pub use recipient::{Coupon, Recipient, StoryRecipient};
pub use story::Story;
pub use subscription::{PlanChange, SubscriptionRecord, STATUS_INACTIVE};
