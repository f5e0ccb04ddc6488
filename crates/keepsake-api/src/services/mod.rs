//! Business logic services.

pub mod billing;
pub mod entitlement;

pub use billing::BillingEventProcessor;
pub use entitlement::EntitlementService;
