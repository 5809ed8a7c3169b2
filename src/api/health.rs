use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::HashMap;

use crate::events::RouterStatsSnapshot;
use crate::registry::RegistryStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: RegistryStats,
    pub total_rooms: usize,
    /// room wire key -> member count
    pub rooms: HashMap<String, usize>,
    pub router: RouterStatsSnapshot,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let rooms = state.rooms.stats().await;

    Json(StatsResponse {
        connections: state.registry.stats(),
        total_rooms: rooms.len(),
        rooms,
        router: state.router.stats(),
    })
}
