//! Axum HTTP API server.
//!
//! This crate provides:
//! - Story, recipient, and subscription REST endpoints
//! - Plan-based quota enforcement
//! - Stripe checkout, portal, and webhook handling
//! - Firebase ID token verification
//! - Rate limiting and security headers

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
