use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::{AuthError, Claims};
use crate::error::AppError;
use crate::metrics::{WsMessageMetrics, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED};
use crate::registry::{ConnectionHandle, RoomKey};
use crate::server::AppState;

use super::message::{ClientMessage, OutboundMessage, ServerMessage};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler. The credential is validated before the
/// protocol upgrade completes, so a rejected handshake never creates
/// connection state.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = extract_token(&query, &headers) else {
        return AppError::Auth(AuthError::CredentialMissing).into_response();
    };

    let claims = match state.jwt_validator.validate(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(code = e.code(), "Handshake rejected");
            return AppError::Auth(e).into_response();
        }
    };

    tracing::info!(user_id = %claims.sub, tenant_id = %claims.tenant_id(), "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state, claims))
}

/// Extract token from query parameter or Authorization header
fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(ref token) = query.token {
        return Some(token.clone());
    }

    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    None
}

/// Drive an established WebSocket connection through its lifecycle:
/// register, auto-join the tenant room, acknowledge, relay frames until the
/// peer goes away or a close is requested, then clean up.
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, claims),
    fields(user_id = %claims.sub, tenant_id = %claims.tenant_id())
)]
async fn handle_socket(socket: WebSocket, state: AppState, claims: Claims) {
    let user_id = claims.sub.clone();
    let tenant_id = claims.tenant_id().to_string();
    let connection_start = std::time::Instant::now();

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(state.settings.websocket.send_buffer);

    let handle = state.registry.register(user_id.clone(), tenant_id, tx);
    let connection_id = handle.id;
    WS_CONNECTIONS_OPENED.inc();

    // Every connection of a tenant observes that tenant's room
    let tenant_room = handle.tenant_room();
    state.rooms.join(connection_id, tenant_room.clone()).await;

    let accepted = handle
        .send(ServerMessage::Connected {
            connection_id,
            tenant_room,
        })
        .await;

    if accepted.is_ok() {
        handle.mark_active();
        tracing::info!(connection_id = %connection_id, "WebSocket connection established");

        let (mut ws_sender, mut ws_receiver) = socket.split();

        // Writer: drain the outbound buffer into the socket. Serializes all
        // writes for this connection.
        let mut send_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let text = match msg.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize outbound message");
                        continue;
                    }
                };

                if ws_sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        // Reader: process inbound control frames
        let state_clone = state.clone();
        let handle_clone = handle.clone();
        let mut recv_task = tokio::spawn(async move {
            while let Some(result) = ws_receiver.next().await {
                match result {
                    Ok(msg) => {
                        if !process_message(msg, &state_clone, &handle_clone).await {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        });

        // Run until the transport fails, the peer closes, or a close is
        // requested from elsewhere (slow-consumer policy, idle sweep,
        // shutdown). Both tasks must be fully stopped before cleanup so no
        // in-flight subscribe can land after leave_all.
        tokio::select! {
            _ = &mut send_task => {
                recv_task.abort();
                let _ = recv_task.await;
                tracing::debug!(connection_id = %connection_id, "Send task completed");
            }
            _ = &mut recv_task => {
                send_task.abort();
                let _ = send_task.await;
                tracing::debug!(connection_id = %connection_id, "Receive task completed");
            }
            _ = handle.closed() => {
                send_task.abort();
                recv_task.abort();
                let _ = recv_task.await;
                let _ = send_task.await;
                tracing::debug!(connection_id = %connection_id, "Close requested");
            }
        }
    } else {
        tracing::warn!(connection_id = %connection_id, "Peer gone before acknowledgment");
    }

    // Cleanup: leave_all is atomic under the room index lock, so an emit
    // sees this connection in all of its rooms or in none of them.
    handle.begin_close();
    state.rooms.leave_all(connection_id).await;
    state.registry.unregister(connection_id);
    handle.mark_closed();

    WS_CONNECTIONS_CLOSED.inc();
    tracing::info!(
        connection_id = %connection_id,
        user_id = %user_id,
        duration_secs = connection_start.elapsed().as_secs_f64(),
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket frame.
/// Returns false if the connection should be closed.
async fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            handle.update_activity();

            let client_msg: ClientMessage = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse client message");
                    let _ = handle
                        .send(ServerMessage::error("INVALID_MESSAGE", e.to_string()))
                        .await;
                    return true;
                }
            };

            handle_client_message(client_msg, state, handle).await;
            true
        }
        Message::Binary(_) => {
            let _ = handle
                .send(ServerMessage::error(
                    "UNSUPPORTED_FORMAT",
                    "Binary messages are not supported",
                ))
                .await;
            true
        }
        Message::Ping(_) => {
            handle.update_activity();
            true
        }
        Message::Pong(_) => {
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}

/// Apply one parsed client control message against connection state. Each
/// message kind is individually idempotent.
#[tracing::instrument(
    name = "ws.message",
    skip(state, handle),
    fields(connection_id = %handle.id, message = ?msg)
)]
pub async fn handle_client_message(
    msg: ClientMessage,
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
) {
    if !handle.is_open() {
        return;
    }

    match msg {
        ClientMessage::Subscribe { stream_id } => {
            WsMessageMetrics::record_subscribe();
            handle_subscribe(stream_id, state, handle).await;
        }
        ClientMessage::Unsubscribe { stream_id } => {
            WsMessageMetrics::record_unsubscribe();
            handle_unsubscribe(stream_id, state, handle).await;
        }
        ClientMessage::Ping => {
            WsMessageMetrics::record_ping();
            let _ = handle.send(ServerMessage::Pong).await;
        }
    }
}

/// Join a stream room, gated on the tenant's entitlement to the stream.
async fn handle_subscribe(stream_id: String, state: &AppState, handle: &Arc<ConnectionHandle>) {
    if !is_valid_stream_id(&stream_id) {
        tracing::warn!(connection_id = %handle.id, stream_id = %stream_id, "Invalid stream id");
        let _ = handle
            .send(ServerMessage::error(
                "INVALID_STREAM",
                format!("Invalid stream id: {}", stream_id),
            ))
            .await;
        return;
    }

    if !state
        .authorizer
        .can_subscribe(&handle.tenant_id, &stream_id)
        .await
    {
        tracing::warn!(
            connection_id = %handle.id,
            tenant_id = %handle.tenant_id,
            stream_id = %stream_id,
            "Subscription denied"
        );
        let _ = handle
            .send(ServerMessage::error(
                "SUBSCRIPTION_DENIED",
                format!("Tenant is not entitled to stream {}", stream_id),
            ))
            .await;
        return;
    }

    state
        .rooms
        .join(handle.id, RoomKey::stream(stream_id.clone()))
        .await;

    tracing::info!(connection_id = %handle.id, stream_id = %stream_id, "Subscribed to stream");
    let _ = handle.send(ServerMessage::subscribed(stream_id)).await;
}

/// Leave a stream room. Tenant rooms are unreachable from here: the client
/// protocol can only name stream rooms.
async fn handle_unsubscribe(stream_id: String, state: &AppState, handle: &Arc<ConnectionHandle>) {
    state
        .rooms
        .leave(handle.id, &RoomKey::stream(stream_id.clone()))
        .await;

    tracing::info!(connection_id = %handle.id, stream_id = %stream_id, "Unsubscribed from stream");
    let _ = handle.send(ServerMessage::unsubscribed(stream_id)).await;
}

/// Validate stream id taken from a client frame
fn is_valid_stream_id(id: &str) -> bool {
    if id.is_empty() || id.len() > 64 {
        return false;
    }

    // Only allow alphanumeric, dash, underscore, and dot
    id.chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
}
