//! Route definitions for web server.

use axum::{routing::get, Router};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use super::api;
use crate::core::QueueManager;
use crate::ingress::Ingress;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub queue: QueueManager,
    /// Present only when the Meta channel is active.
    pub webhook: Option<WebhookState>,
}

#[derive(Clone)]
pub struct WebhookState {
    pub ingress: Ingress,
    pub verify_token: String,
}

/// Create the API router.
pub fn create_api_router() -> Router<AppState> {
    Router::new().route("/queue", get(api::queue_stats))
}

/// Create the full app router.
pub fn create_app_router(state: AppState) -> Router {
    let mut router = Router::new()
        .nest("/api", create_api_router())
        .route("/health", get(health_check));

    if state.webhook.is_some() {
        router = router.route(
            "/webhook",
            get(api::verify_webhook).post(api::receive_webhook),
        );
    }

    router
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
