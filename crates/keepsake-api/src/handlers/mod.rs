//! HTTP request handlers.

pub mod billing;
pub mod health;
pub mod recipients;
pub mod stories;
pub mod subscription;
pub mod webhook;
