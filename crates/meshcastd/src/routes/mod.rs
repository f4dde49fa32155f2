//! HTTP route handlers for meshcastd.

use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod admin;
mod health;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/stats", get(health::stats))

        // Operator triggers
        .nest("/admin", admin_routes())

        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/networks/{network}/peers", post(admin::publish_network_peers))
        .route("/nodes/{node_id}/update", post(admin::publish_node_update))
        .route("/nodes/{node_id}/ext-peers", post(admin::publish_ext_peers))
        .route("/metrics", post(admin::push_metrics))
}
