//! HTTP routes.

pub mod health;
pub mod webhooks;

use crate::AppState;
use axum::Router;
use axum::routing::post;

/// Build the router.
///
/// Deliveries are accepted at `/webhooks/github` and, for hooks configured
/// with a bare host URL, at `/`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(webhooks::github_webhook))
        .nest("/webhooks", webhooks::router())
        .merge(health::router())
        .with_state(state)
}
