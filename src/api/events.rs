//! Emission endpoints.
//!
//! Upstream collaborators (inbound webhook handlers, the processing
//! pipeline) post already-validated events here; this layer only routes.
//! A body that does not deserialize into a known event kind is rejected
//! with 400 before touching any connection state.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::StreamEvent;
use crate::registry::RoomKey;
use crate::server::AppState;

/// Broadcast to an explicit room named in the request body
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub room: RoomKey,
    #[serde(flatten)]
    pub event: StreamEvent,
}

#[derive(Debug, Serialize)]
pub struct EmitResponse {
    pub room: String,
    pub event: &'static str,
    pub delivered: usize,
    pub failed: usize,
    pub emitted_at: DateTime<Utc>,
}

/// Emit an event to a stream room
#[tracing::instrument(
    name = "api.emit_stream",
    skip(state, event),
    fields(stream_id = %stream_id, event = event.name())
)]
pub async fn emit_stream_event(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Json(event): Json<StreamEvent>,
) -> Json<EmitResponse> {
    let room = RoomKey::stream(stream_id);
    emit(state, room, event).await
}

/// Emit an event to a tenant room
#[tracing::instrument(
    name = "api.emit_tenant",
    skip(state, event),
    fields(tenant_id = %tenant_id, event = event.name())
)]
pub async fn emit_tenant_event(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(event): Json<StreamEvent>,
) -> Json<EmitResponse> {
    let room = RoomKey::tenant(tenant_id);
    emit(state, room, event).await
}

/// Emit an event to the room named in the body
#[tracing::instrument(
    name = "api.emit_broadcast",
    skip(state, request),
    fields(room = %request.room, event = request.event.name())
)]
pub async fn emit_broadcast(
    State(state): State<AppState>,
    Json(request): Json<BroadcastRequest>,
) -> Json<EmitResponse> {
    emit(state, request.room, request.event).await
}

async fn emit(state: AppState, room: RoomKey, event: StreamEvent) -> Json<EmitResponse> {
    let event_name = event.name();
    let room_key = room.to_string();
    let result = state.router.emit(room, event).await;

    Json(EmitResponse {
        room: room_key,
        event: event_name,
        delivered: result.delivered,
        failed: result.failed,
        emitted_at: Utc::now(),
    })
}
