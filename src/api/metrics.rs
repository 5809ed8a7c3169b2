//! Prometheus metrics endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::metrics;
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    update_metrics_from_state(&state).await;

    match metrics::encode_metrics() {
        Ok(output) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain")],
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Refresh gauges from live state so a scrape never reads a stale census
async fn update_metrics_from_state(state: &AppState) {
    let registry_stats = state.registry.stats();
    metrics::CONNECTIONS_TOTAL.set(registry_stats.total_connections as i64);
    metrics::SESSIONS_CONNECTED.set(registry_stats.sessions as i64);

    let rooms = state.rooms.stats().await;
    metrics::ROOMS_ACTIVE.set(rooms.len() as i64);

    // Drop labels for rooms that no longer exist before re-populating
    metrics::ROOM_MEMBERS.reset();
    for (room, count) in &rooms {
        metrics::ROOM_MEMBERS
            .with_label_values(&[room])
            .set(*count as i64);
    }
}
