use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::events::{emit_broadcast, emit_stream_event, emit_tenant_event};
use super::health::{health, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Emission endpoints for upstream collaborators (webhook handlers,
        // processing pipeline). Payloads are schema-checked by typed
        // deserialization before they reach the router.
        .nest(
            "/api/v1/events",
            Router::new()
                .route("/streams/{stream_id}", post(emit_stream_event))
                .route("/tenants/{tenant_id}", post(emit_tenant_event))
                .route("/broadcast", post(emit_broadcast))
                .route_layer(middleware::from_fn_with_state(state, api_key_auth)),
        )
}
