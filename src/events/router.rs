//! Event fan-out.
//!
//! The router resolves a room's membership at call time and pushes one
//! envelope to each member's outbound buffer. Pushes never block the
//! emitting caller: a member whose buffer is full (or whose channel is gone)
//! is counted as failed and scheduled for disconnect, and delivery to the
//! remaining members continues.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;

use crate::metrics::EventMetrics;
use crate::registry::{ConnectionRegistry, RoomIndex, RoomKey};
use crate::websocket::{OutboundMessage, ServerMessage};

use super::{EventEnvelope, StreamEvent};

/// Serialize once instead of per member when fan-out is at least this wide
const PRESERIALIZATION_THRESHOLD: usize = 4;

/// Result of one emit call
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    /// Number of members the envelope was handed to
    pub delivered: usize,
    /// Number of members that failed and were scheduled for disconnect
    pub failed: usize,
}

#[derive(Debug, Default)]
struct RouterStats {
    events_emitted: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouterStatsSnapshot {
    pub events_emitted: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
}

/// Delivers events to the current members of a room.
pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomIndex>,
    stats: RouterStats,
}

impl EventRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, rooms: Arc<RoomIndex>) -> Self {
        Self {
            registry,
            rooms,
            stats: RouterStats::default(),
        }
    }

    /// Emit an event to every current member of a stream room.
    pub async fn emit_to_stream(&self, stream_id: &str, event: StreamEvent) -> DeliveryResult {
        self.emit(RoomKey::stream(stream_id), event).await
    }

    /// Emit an event to every current member of a tenant room.
    pub async fn emit_to_tenant(&self, tenant_id: &str, event: StreamEvent) -> DeliveryResult {
        self.emit(RoomKey::tenant(tenant_id), event).await
    }

    /// Emit an event to an explicit room. Membership is resolved at call
    /// time; a room with no members is a silent no-op, not an error.
    #[tracing::instrument(
        name = "router.emit",
        skip(self, event),
        fields(room = %room, event = event.name())
    )]
    pub async fn emit(&self, room: RoomKey, event: StreamEvent) -> DeliveryResult {
        let event_name = event.name();
        let envelope = EventEnvelope::new(room.clone(), event);
        let member_ids = self.rooms.members(&room).await;

        self.stats.events_emitted.fetch_add(1, Ordering::Relaxed);
        EventMetrics::record_emitted(event_name);

        if member_ids.is_empty() {
            tracing::debug!("No subscribers, event dropped");
            return DeliveryResult {
                delivered: 0,
                failed: 0,
            };
        }

        let message = ServerMessage::Event { envelope };
        let outbound = if member_ids.len() >= PRESERIALIZATION_THRESHOLD {
            match OutboundMessage::preserialized(&message) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to pre-serialize event, falling back");
                    OutboundMessage::Raw(message)
                }
            }
        } else {
            OutboundMessage::Raw(message)
        };

        let mut delivered = 0;
        let mut failed = 0;

        for member_id in member_ids {
            // Absent handle means the member finished cleanup after the
            // membership snapshot was taken; nothing to deliver.
            let Some(handle) = self.registry.get(member_id) else {
                continue;
            };

            match handle.try_send(outbound.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    failed += 1;
                    tracing::warn!(
                        connection_id = %handle.id,
                        "Outbound buffer full, scheduling slow consumer for disconnect"
                    );
                    handle.begin_close();
                }
                Err(TrySendError::Closed(_)) => {
                    failed += 1;
                    tracing::debug!(
                        connection_id = %handle.id,
                        "Outbound channel closed, scheduling disconnect"
                    );
                    handle.begin_close();
                }
            }
        }

        self.stats
            .deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats
            .delivery_failures
            .fetch_add(failed as u64, Ordering::Relaxed);
        EventMetrics::record_delivered(delivered as u64);
        EventMetrics::record_failed(failed as u64);

        tracing::debug!(delivered = delivered, failed = failed, "Event routed");

        DeliveryResult { delivered, failed }
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            events_emitted: self.stats.events_emitted.load(Ordering::Relaxed),
            deliveries: self.stats.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.stats.delivery_failures.load(Ordering::Relaxed),
        }
    }
}
