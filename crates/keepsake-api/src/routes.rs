//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::billing::{create_checkout_session, create_portal_session};
use crate::handlers::health::{health, ready};
use crate::handlers::recipients::{
    create_recipient, delete_recipient, get_recipient, list_recipients, update_recipient,
};
use crate::handlers::stories::{
    create_story, delete_story, get_story, get_story_recipients, list_stories,
    set_story_recipients, update_story,
};
use crate::handlers::subscription::{get_subscription, request_storage};
use crate::handlers::webhook::stripe_webhook;
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    let api_routes = Router::new()
        // Subscription and quotas
        .route("/subscription", get(get_subscription))
        .route("/subscription/storage", post(request_storage))
        // Stories
        .route("/stories", get(list_stories).post(create_story))
        .route(
            "/stories/:story_id",
            get(get_story)
                .put(update_story)
                .patch(update_story)
                .delete(delete_story),
        )
        .route(
            "/stories/:story_id/recipients",
            get(get_story_recipients).put(set_story_recipients),
        )
        // Recipients
        .route("/recipients", get(list_recipients).post(create_recipient))
        .route(
            "/recipients/:recipient_id",
            get(get_recipient)
                .put(update_recipient)
                .patch(update_recipient)
                .delete(delete_recipient),
        )
        // Billing
        .route("/checkout-session", post(create_checkout_session))
        .route("/portal-session", post(create_portal_session))
        // Webhook is unauthenticated; the signature is its credential.
        .route("/webhook", post(stripe_webhook))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let mut router = Router::new()
        .nest("/api", api_routes)
        .merge(health_routes);

    if let Some(handle) = metrics_handle {
        router = router.route("/metrics", get(move || std::future::ready(handle.render())));
    }

    router
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
